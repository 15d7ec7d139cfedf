// core/src/error/runtime_error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("{op} failed for {target}: {message}")]
    Operation {
        op: &'static str,
        target: String,
        message: String,
    },

    #[error("pty io error")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn operation(op: &'static str, target: impl Into<String>, message: impl ToString) -> Self {
        RuntimeError::Operation {
            op,
            target: target.into(),
            message: message.to_string(),
        }
    }
}
