// core/src/error/gate_error.rs
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Single-slot mode already holds an undecided command.
    #[error("previous command awaiting confirmation (entry #{pending_id})")]
    Busy { pending_id: u64 },

    #[error("no pending command with id {0}")]
    NotFound(u64),

    /// The execution task for an approved entry panicked.
    #[error("execution of entry #{0} was interrupted")]
    Interrupted(u64),
}
