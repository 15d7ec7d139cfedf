use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Approved => "approved",
            CommandStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Operator-facing view of a proposal. The response channel back to the
/// proposer stays inside the gatekeeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCommand {
    pub id: u64,
    pub session_id: String,
    pub command_text: String,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Terminal outcome delivered to the proposer; also the wire response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: CommandStatus,
    pub output: String,
}

impl Verdict {
    pub fn approved(output: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Approved,
            output: output.into(),
        }
    }

    pub fn rejected(output: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Rejected,
            output: output.into(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == CommandStatus::Approved
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub allow_all: bool,
    pub paused: bool,
}

#[derive(Debug)]
pub enum Submission {
    /// Decided without an operator (paused, allow-all, shutting down).
    Settled(Verdict),
    Queued(Ticket),
}

/// Receiving half of a queued proposal's response channel.
#[derive(Debug)]
pub struct Ticket {
    pub id: u64,
    receiver: oneshot::Receiver<Verdict>,
}

impl Ticket {
    pub(crate) fn new(id: u64, receiver: oneshot::Receiver<Verdict>) -> Self {
        Self { id, receiver }
    }

    /// Resolves once the entry is decided. `None` means the entry was dropped
    /// without a verdict (withdrawn).
    pub async fn wait(&mut self) -> Option<Verdict> {
        (&mut self.receiver).await.ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GateEvent {
    Submitted { entry: PendingCommand },
    Resolved { entry: PendingCommand },
    Withdrawn { id: u64, reason: String },
    PolicyChanged { policy: GatePolicy },
}

impl GateEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GateEvent::Submitted { .. } => "submitted",
            GateEvent::Resolved { .. } => "resolved",
            GateEvent::Withdrawn { .. } => "withdrawn",
            GateEvent::PolicyChanged { .. } => "policy_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_serializes_as_wire_response() {
        let json = serde_json::to_string(&Verdict::approved("hi\n")).unwrap();
        assert_eq!(json, r#"{"status":"approved","output":"hi\n"}"#);
        let json = serde_json::to_string(&Verdict::rejected("")).unwrap();
        assert_eq!(json, r#"{"status":"rejected","output":""}"#);
    }

    #[test]
    fn events_are_tagged() {
        let ev = GateEvent::Withdrawn {
            id: 3,
            reason: "proposer disconnected".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "withdrawn");
        assert_eq!(v["id"], 3);
        assert_eq!(ev.name(), "withdrawn");
    }
}
