use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use ghostgate_core::api::{
    CaptureBuffer, CapturedOutput, ContainerRuntime, ContainerSession, ExecStrategy,
    ExecutionConfig, RuntimeError,
};

/// Runs every command in a fresh `/bin/sh -c` exec and captures until it exits.
pub struct OneShotStrategy {
    exec_timeout: Option<Duration>,
    capture_bytes: usize,
}

impl OneShotStrategy {
    pub fn new(exec_timeout: Option<Duration>, capture_bytes: usize) -> Self {
        Self {
            exec_timeout,
            capture_bytes,
        }
    }

    pub fn from_config(cfg: &ExecutionConfig) -> Self {
        let timeout = (cfg.exec_timeout_ms > 0).then(|| Duration::from_millis(cfg.exec_timeout_ms));
        Self::new(timeout, cfg.capture_bytes)
    }
}

#[async_trait]
impl ExecStrategy for OneShotStrategy {
    fn name(&self) -> &'static str {
        "oneshot"
    }

    fn needs_pty(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        runtime: &dyn ContainerRuntime,
        session: &ContainerSession,
        command: &str,
    ) -> Result<CapturedOutput, RuntimeError> {
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()];
        let mut io = runtime.exec(&session.container, &argv, false).await?;
        let mut buf = CaptureBuffer::new(self.capture_bytes);

        let drain = async {
            while let Some(chunk) = io.output.next().await {
                buf.push(&chunk?);
            }
            Ok::<_, RuntimeError>(())
        };
        let timed_out = match self.exec_timeout {
            Some(limit) => match tokio::time::timeout(limit, drain).await {
                Ok(result) => {
                    result?;
                    false
                }
                Err(_) => true,
            },
            None => {
                drain.await?;
                false
            }
        };

        let mut out = buf.finish();
        if let Some(limit) = self.exec_timeout.filter(|_| timed_out) {
            tracing::warn!(
                target: "ghostgate.exec",
                session_id = %session.session_id,
                timeout_ms = limit.as_millis() as u64,
                "command output cut off"
            );
            if !out.text.is_empty() && !out.text.ends_with('\n') {
                out.text.push('\n');
            }
            out.text
                .push_str(&format!("[command still running after {}ms]\n", limit.as_millis()));
        }
        Ok(out)
    }
}
