use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use ghostgate_core::api::{
    CaptureBuffer, CapturedOutput, ContainerRuntime, ContainerSession, ExecIo, ExecStrategy,
    ExecutionConfig, RuntimeError,
};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use super::tty::normalize_tty_output;

const SESSION_ENDED: &str = "[shell session ended]\n";

/// Types each command into the session's long-lived interactive shell and
/// drains its output for a bounded window.
///
/// The window closes at `drain_timeout`, or earlier once the command has
/// produced output and the shell stays quiet for `poll_interval`. Commands
/// that run longer are cut off; their later output is discarded before the
/// next command is typed.
pub struct PtyRelayStrategy {
    shell: Vec<String>,
    drain_timeout: Duration,
    poll_interval: Duration,
    capture_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainEnd {
    Quiet,
    Window,
    ShellEnded,
}

impl PtyRelayStrategy {
    pub fn new(
        shell: Vec<String>,
        drain_timeout: Duration,
        poll_interval: Duration,
        capture_bytes: usize,
    ) -> Self {
        Self {
            shell,
            drain_timeout,
            poll_interval,
            capture_bytes,
        }
    }

    pub fn from_config(shell: &str, cfg: &ExecutionConfig) -> Self {
        Self::new(
            vec![shell.to_string()],
            Duration::from_millis(cfg.drain_timeout_ms),
            Duration::from_millis(cfg.poll_interval_ms),
            cfg.capture_bytes,
        )
    }

    async fn attach(
        &self,
        runtime: &dyn ContainerRuntime,
        session: &ContainerSession,
    ) -> Result<ExecIo, RuntimeError> {
        tracing::debug!(
            target: "ghostgate.exec",
            session_id = %session.session_id,
            "attaching interactive shell"
        );
        runtime.exec(&session.container, &self.shell, true).await
    }

    async fn drain(&self, io: &mut ExecIo, buf: &mut CaptureBuffer) -> Result<DrainEnd, RuntimeError> {
        let deadline = Instant::now() + self.drain_timeout;
        let mut seen_newline = false;
        let mut started = false;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(DrainEnd::Window);
            }
            let remaining = deadline - now;
            let wait = if started {
                self.poll_interval.min(remaining)
            } else {
                remaining
            };

            match tokio::time::timeout(wait, io.output.next()).await {
                Err(_) if started && wait < remaining => return Ok(DrainEnd::Quiet),
                Err(_) => return Ok(DrainEnd::Window),
                Ok(None) => return Ok(DrainEnd::ShellEnded),
                Ok(Some(chunk)) => {
                    let chunk = chunk?;
                    if !seen_newline {
                        if let Some(pos) = chunk.iter().position(|b| *b == b'\n') {
                            seen_newline = true;
                            started = pos + 1 < chunk.len();
                        }
                    } else if !chunk.is_empty() {
                        started = true;
                    }
                    buf.push(&chunk);
                }
            }
        }
    }
}

/// Drops whatever the shell printed since the last drain. Returns false when
/// the shell output has already ended.
fn discard_pending(io: &mut ExecIo) -> bool {
    loop {
        match io.output.next().now_or_never() {
            Some(Some(_)) => continue,
            Some(None) => return false,
            None => return true,
        }
    }
}

async fn type_line(io: &mut ExecIo, command: &str) -> std::io::Result<()> {
    io.input.write_all(format!("{command}\n").as_bytes()).await?;
    io.input.flush().await
}

#[async_trait]
impl ExecStrategy for PtyRelayStrategy {
    fn name(&self) -> &'static str {
        "pty-relay"
    }

    fn needs_pty(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        runtime: &dyn ContainerRuntime,
        session: &ContainerSession,
        command: &str,
    ) -> Result<CapturedOutput, RuntimeError> {
        let mut pty = session.lock_pty().await;

        let alive = match pty.as_mut() {
            Some(io) => discard_pending(io),
            None => false,
        };
        let typed = match pty.as_mut() {
            Some(io) if alive => type_line(io, command).await.is_ok(),
            _ => false,
        };
        if !typed {
            // One fresh shell per execution at most.
            if pty.is_some() {
                tracing::info!(
                    target: "ghostgate.exec",
                    session_id = %session.session_id,
                    "interactive shell gone, respawning"
                );
            }
            *pty = None;
            let mut io = self.attach(runtime, session).await?;
            type_line(&mut io, command).await?;
            *pty = Some(io);
        }

        let Some(io) = pty.as_mut() else {
            return Err(RuntimeError::operation(
                "pty_relay",
                &session.container.name,
                "no interactive shell attached",
            ));
        };
        let mut buf = CaptureBuffer::new(self.capture_bytes);
        let end = match self.drain(io, &mut buf).await {
            Ok(end) => end,
            Err(e) => {
                *pty = None;
                return Err(e);
            }
        };

        let echo = (buf.dropped_bytes() == 0).then_some(command);
        let mut out = buf.finish_with(|tail| normalize_tty_output(tail, echo));

        tracing::debug!(
            target: "ghostgate.exec",
            session_id = %session.session_id,
            end = ?end,
            bytes = out.bytes,
            "relay drain finished"
        );
        if end == DrainEnd::ShellEnded {
            *pty = None;
            if !out.text.is_empty() && !out.text.ends_with('\n') {
                out.text.push('\n');
            }
            out.text.push_str(SESSION_ENDED);
        }
        Ok(out)
    }
}
