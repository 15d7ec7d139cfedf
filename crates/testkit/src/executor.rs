use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ghostgate_core::api::{CommandExecutor, ExecOutput};

use crate::script::{run_script, ShellState};

/// Records every run and answers from the scripted shell, one shell state per
/// session id.
#[derive(Default)]
pub struct FakeExecutor {
    calls: Mutex<Vec<(String, String)>>,
    shells: tokio::sync::Mutex<HashMap<String, ShellState>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every run takes at least `delay`.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let exec = Self::default();
        *exec.delay.lock().unwrap() = Some(delay);
        Arc::new(exec)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// `(session_id, command)` pairs in the order they ran.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn run(&self, session_id: &str, command: &str) -> ExecOutput {
        self.calls
            .lock()
            .unwrap()
            .push((session_id.to_string(), command.to_string()));

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut shells = self.shells.lock().await;
        let state = shells
            .entry(session_id.to_string())
            .or_insert_with(|| ShellState::new(session_id));
        let text = run_script(state, command).await;
        ExecOutput {
            text,
            failed: false,
            truncated: false,
            duration_ms: 0,
        }
    }
}
