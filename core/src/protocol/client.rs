use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::error::ProtocolError;
use crate::gatekeeper::Verdict;

use super::codec::{read_response, write_request, Framing, ProposalRequest};
use super::Endpoint;

const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Sends one proposal and blocks until the gate answers. The write side is
/// kept open while waiting; closing it early counts as walking away.
pub async fn propose(
    endpoint: &Endpoint,
    request: &ProposalRequest,
    framing: Framing,
) -> Result<Verdict, ProtocolError> {
    match endpoint {
        #[cfg(unix)]
        Endpoint::Unix(path) => exchange(UnixStream::connect(path).await?, request, framing).await,
        Endpoint::Tcp(addr) => exchange(TcpStream::connect(addr).await?, request, framing).await,
    }
}

async fn exchange<S>(stream: S, request: &ProposalRequest, framing: Framing) -> Result<Verdict, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    write_request(&mut write_half, request, framing).await?;
    let mut reader = BufReader::new(read_half);
    read_response(&mut reader, framing, MAX_RESPONSE_BYTES).await
}
