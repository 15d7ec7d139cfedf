use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::gatekeeper::Verdict;

/// How one message is delimited on the wire. Responses mirror the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON object terminated by `\n` (or by EOF).
    Line,
    /// 4-byte big-endian length, then that many bytes of JSON.
    LengthPrefixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRequest {
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub command: String,
}

impl ProposalRequest {
    pub fn new(session: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            command: command.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodedRequest {
    pub request: ProposalRequest,
    pub framing: Framing,
    /// The request ended on its own delimiter rather than on EOF, so the
    /// peer is expected to keep its side open until it gets a response.
    pub terminated: bool,
}

/// Reads exactly one request. Leading whitespace is skipped; a `{` selects
/// line framing, anything else is taken as a length prefix.
pub async fn read_request<R>(reader: &mut R, max_bytes: usize) -> Result<DecodedRequest, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let first = loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Err(ProtocolError::Closed);
        }
        let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
        if skip < buf.len() {
            let first = buf[skip];
            reader.consume(skip);
            break first;
        }
        let n = buf.len();
        reader.consume(n);
    };

    if first == b'{' {
        let mut line = Vec::new();
        let limit = max_bytes as u64 + 1;
        (&mut *reader).take(limit).read_until(b'\n', &mut line).await?;

        let terminated = line.last() == Some(&b'\n');
        if terminated {
            line.pop();
        } else if line.len() > max_bytes {
            return Err(ProtocolError::TooLarge {
                actual_bytes: line.len(),
                max_bytes,
            });
        }
        let request = parse_request(&line)?;
        return Ok(DecodedRequest {
            request,
            framing: Framing::Line,
            terminated,
        });
    }

    let mut len = [0u8; 4];
    reader.read_exact(&mut len).await?;
    let len = u32::from_be_bytes(len) as usize;
    if len > max_bytes {
        return Err(ProtocolError::TooLarge {
            actual_bytes: len,
            max_bytes,
        });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(DecodedRequest {
        request: parse_request(&body)?,
        framing: Framing::LengthPrefixed,
        terminated: true,
    })
}

fn parse_request(raw: &[u8]) -> Result<ProposalRequest, ProtocolError> {
    let request: ProposalRequest = serde_json::from_slice(raw)
        .map_err(|e| ProtocolError::Malformed(format!("invalid json: {e}")))?;
    if request.session.trim().is_empty() {
        return Err(ProtocolError::Malformed("missing session".into()));
    }
    if request.command.trim().is_empty() {
        return Err(ProtocolError::Malformed("missing command".into()));
    }
    Ok(request)
}

pub async fn write_response<W>(writer: &mut W, verdict: &Verdict, framing: Framing) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_message(writer, verdict, framing).await
}

pub async fn write_request<W>(
    writer: &mut W,
    request: &ProposalRequest,
    framing: Framing,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_message(writer, request, framing).await
}

async fn write_message<W, T>(writer: &mut W, message: &T, framing: Framing) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message)
        .map_err(|e| ProtocolError::Malformed(format!("encode failed: {e}")))?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::LengthPrefixed => {
            let len = u32::try_from(body.len()).map_err(|_| ProtocolError::TooLarge {
                actual_bytes: body.len(),
                max_bytes: u32::MAX as usize,
            })?;
            writer.write_all(&len.to_be_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

/// Reads the single response a listener sends back.
pub async fn read_response<R>(reader: &mut R, framing: Framing, max_bytes: usize) -> Result<Verdict, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let body = match framing {
        Framing::Line => {
            let mut line = Vec::new();
            (&mut *reader)
                .take(max_bytes as u64 + 1)
                .read_until(b'\n', &mut line)
                .await?;
            if line.is_empty() {
                return Err(ProtocolError::NoResponse);
            }
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            line
        }
        Framing::LengthPrefixed => {
            let mut len = [0u8; 4];
            match reader.read_exact(&mut len).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(ProtocolError::NoResponse)
                }
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_be_bytes(len) as usize;
            if len > max_bytes {
                return Err(ProtocolError::TooLarge {
                    actual_bytes: len,
                    max_bytes,
                });
            }
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).await?;
            body
        }
    };
    serde_json::from_slice(&body).map_err(|e| ProtocolError::Malformed(format!("invalid response: {e}")))
}
