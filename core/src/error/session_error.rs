// core/src/error/session_error.rs
use thiserror::Error;

use super::RuntimeError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no container running for session {0}")]
    NotRunning(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
