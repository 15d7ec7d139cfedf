use std::io;
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::ListenerConfig;
use crate::gatekeeper::{CommandStatus, Gatekeeper, Submission, Ticket, Verdict};

use super::codec::{read_request, write_response, Framing};
use super::Endpoint;

const DRAIN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ListenerOptions {
    /// `None` waits for the operator indefinitely.
    pub decision_timeout: Option<Duration>,
    pub max_request_bytes: usize,
}

impl ListenerOptions {
    pub fn from_config(cfg: &ListenerConfig) -> Self {
        Self {
            decision_timeout: (cfg.decision_timeout_ms > 0)
                .then(|| Duration::from_millis(cfg.decision_timeout_ms)),
            max_request_bytes: cfg.max_request_bytes,
        }
    }
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self::from_config(&ListenerConfig::default())
    }
}

/// A bound proposer socket. Dropping it removes the socket file.
#[derive(Debug)]
pub enum BoundListener {
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
}

enum Connection {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl BoundListener {
    pub async fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                if path.exists() {
                    if UnixStream::connect(path).await.is_ok() {
                        return Err(io::Error::new(
                            io::ErrorKind::AddrInUse,
                            format!("another listener is serving {}", path.display()),
                        ));
                    }
                    tracing::debug!(
                        target: "ghostgate.protocol",
                        path = %path.display(),
                        "removing stale socket file"
                    );
                    std::fs::remove_file(path)?;
                }
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let listener = UnixListener::bind(path)?;
                Ok(BoundListener::Unix {
                    listener,
                    path: path.clone(),
                })
            }
            Endpoint::Tcp(addr) => Ok(BoundListener::Tcp(TcpListener::bind(addr).await?)),
        }
    }

    /// The endpoint actually bound (resolves port 0 for TCP).
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            #[cfg(unix)]
            BoundListener::Unix { path, .. } => Ok(Endpoint::Unix(path.clone())),
            BoundListener::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?)),
        }
    }

    async fn accept(&self) -> io::Result<Connection> {
        match self {
            #[cfg(unix)]
            BoundListener::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Connection::Unix(stream))
            }
            BoundListener::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Connection::Tcp(stream))
            }
        }
    }
}

impl Drop for BoundListener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let BoundListener::Unix { path, .. } = self {
            if let Err(e) = std::fs::remove_file(&*path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        target: "ghostgate.protocol",
                        path = %path.display(),
                        error = %e,
                        "failed to remove socket file"
                    );
                }
            }
        }
    }
}

/// What happened to one proposer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Unreadable or invalid request; closed without a response.
    Malformed,
    Responded(CommandStatus),
    /// The proposer went away before a response could be written.
    Abandoned,
}

pub struct ProtocolListener {
    gatekeeper: Arc<Gatekeeper>,
    opts: ListenerOptions,
}

impl ProtocolListener {
    pub fn new(gatekeeper: Arc<Gatekeeper>, opts: ListenerOptions) -> Self {
        Self { gatekeeper, opts }
    }

    /// Accepts connections until `shutdown` fires, then rejects everything still
    /// pending and gives open connections a short grace period to answer.
    pub async fn serve(
        self: Arc<Self>,
        bound: BoundListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let endpoint = bound.local_endpoint()?;
        tracing::info!(target: "ghostgate.protocol", endpoint = %endpoint, "listening for proposals");

        let mut tasks: JoinSet<ConnectionOutcome> = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = bound.accept() => match accepted {
                    Ok(conn) => {
                        let this = self.clone();
                        tasks.spawn(async move { this.handle_connection(conn).await });
                    }
                    Err(e) => {
                        tracing::warn!(target: "ghostgate.protocol", error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!(target: "ghostgate.protocol", error = %e, "connection task failed");
                    }
                }
            }
        }

        self.gatekeeper.shutdown("shutting down");
        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                target: "ghostgate.protocol",
                remaining = tasks.len(),
                "aborting connections still open after shutdown"
            );
            tasks.abort_all();
        }

        drop(bound);
        tracing::info!(target: "ghostgate.protocol", endpoint = %endpoint, "listener stopped");
        Ok(())
    }

    async fn handle_connection(&self, conn: Connection) -> ConnectionOutcome {
        match conn {
            #[cfg(unix)]
            Connection::Unix(stream) => self.handle_stream(stream).await,
            Connection::Tcp(stream) => self.handle_stream(stream).await,
        }
    }

    /// Serves exactly one request on `stream`.
    pub async fn handle_stream<S>(&self, stream: S) -> ConnectionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let decoded = match read_request(&mut reader, self.opts.max_request_bytes).await {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(target: "ghostgate.protocol", error = %e, "dropping connection");
                return ConnectionOutcome::Malformed;
            }
        };
        let request = decoded.request;
        tracing::debug!(
            target: "ghostgate.protocol",
            session_id = %request.session,
            framing = ?decoded.framing,
            "proposal received"
        );

        let verdict = match self
            .gatekeeper
            .submit(&request.session, &request.command)
            .await
        {
            Ok(Submission::Settled(v)) => v,
            Ok(Submission::Queued(ticket)) => {
                let eof_is_disconnect =
                    decoded.framing == Framing::Line && decoded.terminated;
                match self.await_decision(ticket, &mut reader, eof_is_disconnect).await {
                    Some(v) => v,
                    None => return ConnectionOutcome::Abandoned,
                }
            }
            Err(e) => {
                tracing::info!(
                    target: "ghostgate.protocol",
                    session_id = %request.session,
                    reason = %e,
                    "proposal refused"
                );
                Verdict::rejected(format!("rejected: {e}"))
            }
        };

        if let Err(e) = write_response(&mut write_half, &verdict, decoded.framing).await {
            tracing::warn!(
                target: "ghostgate.protocol",
                session_id = %request.session,
                error = %e,
                "response could not be delivered"
            );
            return ConnectionOutcome::Abandoned;
        }
        let _ = write_half.shutdown().await;
        ConnectionOutcome::Responded(verdict.status)
    }

    async fn await_decision<R>(
        &self,
        mut ticket: Ticket,
        reader: &mut R,
        eof_is_disconnect: bool,
    ) -> Option<Verdict>
    where
        R: AsyncRead + Unpin,
    {
        let deadline = self.opts.decision_timeout.map(|d| Instant::now() + d);
        let mut watching = true;
        let mut timed_out = false;
        let mut probe = [0u8; 256];

        loop {
            let expiry = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                verdict = ticket.wait() => return verdict,
                read = reader.read(&mut probe), if watching => match read {
                    Ok(0) if eof_is_disconnect => {
                        self.abandon(&ticket, "proposer disconnected");
                        return None;
                    }
                    Ok(0) => watching = false,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(target: "ghostgate.protocol", id = ticket.id, error = %e, "read error while waiting");
                        self.abandon(&ticket, "proposer disconnected");
                        return None;
                    }
                },
                _ = expiry, if !timed_out => {
                    timed_out = true;
                    if self.gatekeeper.withdraw(ticket.id, "no decision before timeout") {
                        let waited = self.opts.decision_timeout.unwrap_or_default();
                        return Some(Verdict::rejected(format!(
                            "rejected: no decision within {}s",
                            waited.as_secs()
                        )));
                    }
                    // The operator already took it; wait for the execution result.
                }
            }
        }
    }

    fn abandon(&self, ticket: &Ticket, reason: &str) {
        if !self.gatekeeper.withdraw(ticket.id, reason) {
            tracing::info!(
                target: "ghostgate.protocol",
                id = ticket.id,
                "proposer left while its command was executing"
            );
        }
    }
}
