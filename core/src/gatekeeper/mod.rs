mod gatekeeper;
mod types;

pub use gatekeeper::{GateOptions, Gatekeeper};
pub use types::{
    CommandStatus, GateEvent, GatePolicy, PendingCommand, Submission, Ticket, Verdict,
};
