use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::{broadcast, oneshot};

use crate::config::{ApprovalMode, GatekeeperConfig};
use crate::error::GateError;
use crate::exec::CommandExecutor;

use super::types::{
    CommandStatus, GateEvent, GatePolicy, PendingCommand, Submission, Ticket, Verdict,
};

const EVENT_CAPACITY: usize = 256;
const ORPHAN_REASON: &str = "proposer disconnected";

#[derive(Debug, Clone)]
pub struct GateOptions {
    pub mode: ApprovalMode,
    pub history_size: usize,
    pub policy: GatePolicy,
}

impl GateOptions {
    pub fn from_config(cfg: &GatekeeperConfig) -> Self {
        Self {
            mode: cfg.approval_mode,
            history_size: cfg.history_size,
            policy: GatePolicy {
                allow_all: cfg.allow_all,
                paused: cfg.paused,
            },
        }
    }
}

impl Default for GateOptions {
    fn default() -> Self {
        Self::from_config(&GatekeeperConfig::default())
    }
}

struct Entry {
    view: PendingCommand,
    origin: oneshot::Sender<Verdict>,
}

struct GateState {
    next_id: u64,
    queue: VecDeque<Entry>,
    policy: GatePolicy,
    history: VecDeque<PendingCommand>,
    closed: Option<String>,
}

/// Queue, history and event feed. Shared with approved executions so they
/// can settle their entry after the deciding caller has gone.
struct Shared {
    history_size: usize,
    state: Mutex<GateState>,
    events: broadcast::Sender<GateEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: GateEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn finish(&self, mut view: PendingCommand, verdict: &Verdict) -> PendingCommand {
        view.status = verdict.status;
        view.output = Some(verdict.output.clone());
        view.resolved_at = Some(Utc::now());
        {
            let mut st = self.lock();
            self.push_history(&mut st, view.clone());
        }
        self.emit(GateEvent::Resolved {
            entry: view.clone(),
        });
        view
    }

    fn record_withdrawn(&self, st: &mut GateState, mut view: PendingCommand, reason: &str) {
        let id = view.id;
        view.status = CommandStatus::Rejected;
        view.output = Some(reason.to_string());
        view.resolved_at = Some(Utc::now());
        self.push_history(st, view);
        self.emit(GateEvent::Withdrawn {
            id,
            reason: reason.to_string(),
        });
    }

    fn prune_orphans(&self, st: &mut GateState) {
        let mut i = 0;
        while i < st.queue.len() {
            if st.queue[i].origin.is_closed() {
                if let Some(entry) = st.queue.remove(i) {
                    tracing::warn!(
                        target: "ghostgate.gatekeeper",
                        id = entry.view.id,
                        "orphaned entry pruned"
                    );
                    self.record_withdrawn(st, entry.view, ORPHAN_REASON);
                }
            } else {
                i += 1;
            }
        }
    }

    fn push_history(&self, st: &mut GateState, view: PendingCommand) {
        if self.history_size == 0 {
            return;
        }
        while st.history.len() >= self.history_size {
            st.history.pop_front();
        }
        st.history.push_back(view);
    }
}

fn deliver(id: u64, origin: oneshot::Sender<Verdict>, verdict: &Verdict) {
    if origin.send(verdict.clone()).is_err() {
        tracing::warn!(
            target: "ghostgate.gatekeeper",
            id,
            "proposer went away before the result was delivered"
        );
    }
}

/// Holds every undecided proposal and applies operator decisions to them.
///
/// All state sits behind one mutex that is never held across an await;
/// approved commands run after their entry has left the queue.
pub struct Gatekeeper {
    mode: ApprovalMode,
    executor: Arc<dyn CommandExecutor>,
    shared: Arc<Shared>,
}

impl Gatekeeper {
    pub fn new(executor: Arc<dyn CommandExecutor>, opts: GateOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            mode: opts.mode,
            executor,
            shared: Arc::new(Shared {
                history_size: opts.history_size,
                state: Mutex::new(GateState {
                    next_id: 1,
                    queue: VecDeque::new(),
                    policy: opts.policy,
                    history: VecDeque::new(),
                    closed: None,
                }),
                events,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.shared.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.shared.events.subscribe()
    }

    pub async fn submit(
        &self,
        session_id: &str,
        command_text: &str,
    ) -> Result<Submission, GateError> {
        let auto_entry = {
            let mut st = self.lock();
            self.shared.prune_orphans(&mut st);

            if let Some(reason) = &st.closed {
                return Ok(Submission::Settled(Verdict::rejected(format!(
                    "rejected: {reason}"
                ))));
            }
            if st.policy.paused {
                tracing::info!(
                    target: "ghostgate.gatekeeper",
                    session_id = %session_id,
                    "submission rejected while paused"
                );
                return Ok(Submission::Settled(Verdict::rejected(
                    "rejected: approvals are paused",
                )));
            }

            if !st.policy.allow_all && self.mode == ApprovalMode::Single {
                if let Some(front) = st.queue.front() {
                    return Err(GateError::Busy {
                        pending_id: front.view.id,
                    });
                }
            }

            let id = st.next_id;
            st.next_id += 1;
            let view = PendingCommand {
                id,
                session_id: session_id.to_string(),
                command_text: command_text.to_string(),
                status: CommandStatus::Pending,
                output: None,
                submitted_at: Utc::now(),
                resolved_at: None,
            };

            if st.policy.allow_all {
                view
            } else {
                let (origin, receiver) = oneshot::channel();
                st.queue.push_back(Entry {
                    view: view.clone(),
                    origin,
                });
                tracing::info!(
                    target: "ghostgate.gatekeeper",
                    id,
                    session_id = %session_id,
                    pending = st.queue.len(),
                    "command awaiting approval"
                );
                self.shared.emit(GateEvent::Submitted { entry: view });
                return Ok(Submission::Queued(Ticket::new(id, receiver)));
            }
        };

        tracing::info!(
            target: "ghostgate.gatekeeper",
            id = auto_entry.id,
            session_id = %session_id,
            "auto-approving under allow-all"
        );
        let output = self.executor.run(session_id, command_text).await;
        let verdict = Verdict::approved(output.text);
        self.shared.finish(auto_entry, &verdict);
        Ok(Submission::Settled(verdict))
    }

    /// Applies an operator decision. Approval executes the command exactly once:
    /// the entry leaves the queue before execution starts.
    ///
    /// The execution runs on its own task, so dropping this future detaches
    /// the caller but the proposer still gets the verdict.
    pub async fn decide(&self, id: u64, approve: bool) -> Result<PendingCommand, GateError> {
        let Entry { view, origin } = {
            let mut st = self.lock();
            let entry = st
                .queue
                .iter()
                .position(|e| e.view.id == id)
                .and_then(|pos| st.queue.remove(pos))
                .ok_or(GateError::NotFound(id))?;

            if entry.origin.is_closed() {
                tracing::warn!(
                    target: "ghostgate.gatekeeper",
                    id,
                    "decision for orphaned entry discarded"
                );
                self.shared.record_withdrawn(&mut st, entry.view, ORPHAN_REASON);
                return Err(GateError::NotFound(id));
            }
            entry
        };

        if !approve {
            tracing::info!(
                target: "ghostgate.gatekeeper",
                id,
                session_id = %view.session_id,
                "command rejected"
            );
            let verdict = Verdict::rejected("");
            deliver(id, origin, &verdict);
            return Ok(self.shared.finish(view, &verdict));
        }

        tracing::info!(
            target: "ghostgate.gatekeeper",
            id,
            session_id = %view.session_id,
            "command approved"
        );
        let executor = Arc::clone(&self.executor);
        let shared = Arc::clone(&self.shared);
        let execution = tokio::spawn(async move {
            let output = executor.run(&view.session_id, &view.command_text).await;
            let verdict = Verdict::approved(output.text);
            let entry = shared.finish(view, &verdict);
            deliver(id, origin, &verdict);
            entry
        });

        execution.await.map_err(|e| {
            tracing::error!(
                target: "ghostgate.gatekeeper",
                id,
                error = %e,
                "approved command execution panicked"
            );
            GateError::Interrupted(id)
        })
    }

    /// Drops a still-pending entry on behalf of its connection. Returns false
    /// when the entry is already being decided or gone.
    pub fn withdraw(&self, id: u64, reason: &str) -> bool {
        let mut st = self.lock();
        let Some(pos) = st.queue.iter().position(|e| e.view.id == id) else {
            return false;
        };
        let Some(entry) = st.queue.remove(pos) else {
            return false;
        };
        tracing::info!(
            target: "ghostgate.gatekeeper",
            id,
            reason = %reason,
            "pending command withdrawn"
        );
        self.shared.record_withdrawn(&mut st, entry.view, reason);
        true
    }

    /// Pending entries, oldest first.
    pub fn snapshot(&self) -> Vec<PendingCommand> {
        let mut st = self.lock();
        self.shared.prune_orphans(&mut st);
        st.queue.iter().map(|e| e.view.clone()).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().queue.len()
    }

    /// Recently resolved entries, newest last.
    pub fn history(&self) -> Vec<PendingCommand> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn policy(&self) -> GatePolicy {
        self.lock().policy
    }

    pub fn set_policy(&self, allow_all: bool, paused: bool) -> GatePolicy {
        self.update_policy(Some(allow_all), Some(paused))
    }

    /// Changes only the flags that are given. Entries already pending keep
    /// waiting for an operator.
    pub fn update_policy(&self, allow_all: Option<bool>, paused: Option<bool>) -> GatePolicy {
        let policy = {
            let mut st = self.lock();
            if let Some(v) = allow_all {
                st.policy.allow_all = v;
            }
            if let Some(v) = paused {
                st.policy.paused = v;
            }
            st.policy
        };
        tracing::info!(
            target: "ghostgate.gatekeeper",
            allow_all = policy.allow_all,
            paused = policy.paused,
            "policy updated"
        );
        self.shared.emit(GateEvent::PolicyChanged { policy });
        policy
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    /// Rejects every pending entry with `reason` and refuses new submissions.
    pub fn shutdown(&self, reason: &str) -> usize {
        let drained: Vec<Entry> = {
            let mut st = self.lock();
            if st.closed.is_none() {
                st.closed = Some(reason.to_string());
            }
            st.queue.drain(..).collect()
        };

        let count = drained.len();
        for Entry { view, origin } in drained {
            let verdict = Verdict::rejected(format!("rejected: {reason}"));
            let _ = origin.send(verdict.clone());
            self.shared.finish(view, &verdict);
        }
        tracing::info!(
            target: "ghostgate.gatekeeper",
            rejected = count,
            reason = %reason,
            "gatekeeper closed"
        );
        count
    }
}
