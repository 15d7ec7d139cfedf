// core/src/exec/trait.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::runtime::ContainerRuntime;
use crate::session::ContainerSession;

use super::CapturedOutput;

/// How a command line is run inside a session container.
#[async_trait]
pub trait ExecStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sessions must have an interactive shell attached for this strategy.
    fn needs_pty(&self) -> bool;

    async fn execute(
        &self,
        runtime: &dyn ContainerRuntime,
        session: &ContainerSession,
        command: &str,
    ) -> Result<CapturedOutput, RuntimeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub text: String,
    /// The command never ran to completion because of a runtime failure.
    /// `text` then carries the error description.
    pub failed: bool,
    pub truncated: bool,
    pub duration_ms: u64,
}

impl ExecOutput {
    pub fn failure(text: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            text: text.into(),
            failed: true,
            truncated: false,
            duration_ms,
        }
    }
}

/// What the gatekeeper calls to run an approved command. Never fails: runtime
/// problems come back as output text.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, session_id: &str, command: &str) -> ExecOutput;
}
