use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::runtime::{ContainerHandle, ExecIo};

/// One container (and optionally one attached interactive shell) per session id.
#[derive(Debug)]
pub struct ContainerSession {
    pub session_id: String,
    pub container: ContainerHandle,
    pub image: String,
    pub created_at: DateTime<Utc>,
    pty: Mutex<Option<ExecIo>>,
}

impl ContainerSession {
    pub fn new(
        session_id: impl Into<String>,
        container: ContainerHandle,
        image: impl Into<String>,
        pty: Option<ExecIo>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            container,
            image: image.into(),
            created_at: Utc::now(),
            pty: Mutex::new(pty),
        }
    }

    /// Exclusive access to the session shell. Holding the guard serializes
    /// relay executions on this session.
    pub async fn lock_pty(&self) -> MutexGuard<'_, Option<ExecIo>> {
        self.pty.lock().await
    }

    pub fn status(&self, running: bool) -> SessionStatus {
        SessionStatus {
            session_id: self.session_id.clone(),
            container_id: self.container.id.clone(),
            container_name: self.container.name.clone(),
            image: self.image.clone(),
            running,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub container_id: String,
    pub container_name: String,
    pub image: String,
    pub running: bool,
    pub created_at: DateTime<Utc>,
}
