//! Raw byte bridge between a network peer and an interactive shell in a
//! session container. Traffic here bypasses the approval gate.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::SessionError;
use crate::runtime::ExecIo;
use crate::session::SessionRegistry;

/// Opens a fresh interactive shell for a session.
#[async_trait]
pub trait PtyProvider: Send + Sync {
    async fn open(&self, session_id: &str) -> Result<ExecIo, SessionError>;
}

pub struct RegistryPtyProvider {
    registry: Arc<SessionRegistry>,
}

impl RegistryPtyProvider {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PtyProvider for RegistryPtyProvider {
    async fn open(&self, session_id: &str) -> Result<ExecIo, SessionError> {
        let session = self.registry.get_or_create(session_id, None).await?;
        let io = self
            .registry
            .runtime()
            .exec(&session.container, &self.registry.shell_command(), true)
            .await?;
        Ok(io)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeEnd {
    Network,
    Pty,
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeSummary {
    pub session_id: String,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub closed_by: BridgeEnd,
}

/// Pumps `inbound` into the shell and shell output into `outbound` until either
/// side ends. Both directions are released when this returns.
pub async fn run_bridge<I, O>(
    session_id: &str,
    pty: ExecIo,
    mut inbound: I,
    mut outbound: O,
) -> BridgeSummary
where
    I: Stream<Item = Bytes> + Unpin + Send,
    O: Sink<Bytes> + Unpin + Send,
{
    let ExecIo {
        mut output,
        mut input,
    } = pty;
    let mut bytes_in = 0u64;
    let mut bytes_out = 0u64;

    let closed_by = {
        let to_pty = async {
            while let Some(chunk) = inbound.next().await {
                if input.write_all(&chunk).await.is_err() || input.flush().await.is_err() {
                    return BridgeEnd::Pty;
                }
                bytes_in += chunk.len() as u64;
            }
            BridgeEnd::Network
        };

        let to_net = async {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(chunk) => {
                        let n = chunk.len() as u64;
                        if outbound.send(chunk).await.is_err() {
                            return BridgeEnd::Network;
                        }
                        bytes_out += n;
                    }
                    Err(e) => {
                        tracing::debug!(target: "ghostgate.bridge", error = %e, "pty read failed");
                        break;
                    }
                }
            }
            BridgeEnd::Pty
        };

        tokio::select! {
            end = to_pty => end,
            end = to_net => end,
        }
    };

    let _ = input.shutdown().await;
    let _ = outbound.close().await;

    tracing::info!(
        target: "ghostgate.bridge",
        session_id = %session_id,
        bytes_in,
        bytes_out,
        closed_by = ?closed_by,
        "bridge closed"
    );
    BridgeSummary {
        session_id: session_id.to_string(),
        bytes_in,
        bytes_out,
        closed_by,
    }
}
