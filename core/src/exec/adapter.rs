use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::session::SessionRegistry;

use super::{CommandExecutor, ExecOutput, ExecStrategy};

/// Runs approved commands in their session container using the configured strategy.
pub struct ExecutionAdapter {
    registry: Arc<SessionRegistry>,
    strategy: Arc<dyn ExecStrategy>,
}

impl ExecutionAdapter {
    pub fn new(registry: Arc<SessionRegistry>, strategy: Arc<dyn ExecStrategy>) -> Self {
        Self { registry, strategy }
    }
}

#[async_trait]
impl CommandExecutor for ExecutionAdapter {
    async fn run(&self, session_id: &str, command: &str) -> ExecOutput {
        let started = Instant::now();
        let elapsed = |started: Instant| started.elapsed().as_millis() as u64;

        let session = match self.registry.get_or_create(session_id, None).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    target: "ghostgate.exec",
                    session_id = %session_id,
                    error = %describe_error(&e),
                    "session unavailable"
                );
                return ExecOutput::failure(
                    format!("error: {}", describe_error(&e)),
                    elapsed(started),
                );
            }
        };

        match self
            .strategy
            .execute(self.registry.runtime().as_ref(), &session, command)
            .await
        {
            Ok(captured) => {
                let duration_ms = elapsed(started);
                tracing::info!(
                    target: "ghostgate.exec",
                    session_id = %session_id,
                    strategy = self.strategy.name(),
                    bytes = captured.bytes,
                    truncated = captured.truncated,
                    duration_ms,
                    "command finished"
                );
                ExecOutput {
                    text: captured.text,
                    failed: false,
                    truncated: captured.truncated,
                    duration_ms,
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "ghostgate.exec",
                    session_id = %session_id,
                    strategy = self.strategy.name(),
                    error = %describe_error(&e),
                    "command failed"
                );
                ExecOutput::failure(format!("error: {}", describe_error(&e)), elapsed(started))
            }
        }
    }
}

/// Flattens an error and its sources into one line.
pub fn describe_error(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        let msg = s.to_string();
        if !out.ends_with(&msg) {
            out.push_str(": ");
            out.push_str(&msg);
        }
        source = s.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RuntimeError, SessionError};

    #[test]
    fn describe_error_includes_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = SessionError::Runtime(RuntimeError::Io(io));
        assert_eq!(describe_error(&err), "pty io error: pipe closed");
    }

    #[test]
    fn describe_error_skips_repeated_messages() {
        let err = SessionError::Runtime(RuntimeError::Unavailable("daemon down".into()));
        assert_eq!(
            describe_error(&err),
            "container runtime unavailable: daemon down"
        );
    }
}
