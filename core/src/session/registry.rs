use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::config::ContainerConfig;
use crate::error::SessionError;
use crate::runtime::{ContainerHandle, ContainerRuntime};

use super::types::{ContainerSession, SessionStatus};

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub image: String,
    pub container_prefix: String,
    pub shell: String,
    /// Attach an interactive shell (`exec`, tty) when a session comes up.
    pub attach_pty: bool,
}

impl RegistryOptions {
    pub fn from_config(cfg: &ContainerConfig, attach_pty: bool) -> Self {
        Self {
            image: cfg.image.clone(),
            container_prefix: cfg.container_prefix.clone(),
            shell: cfg.shell.clone(),
            attach_pty,
        }
    }
}

pub struct SessionRegistry {
    runtime: Arc<dyn ContainerRuntime>,
    opts: RegistryOptions,
    creating: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    live: RwLock<HashMap<String, Arc<ContainerSession>>>,
}

impl SessionRegistry {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, opts: RegistryOptions) -> Self {
        Self {
            runtime,
            opts,
            creating: Mutex::new(HashMap::new()),
            live: RwLock::new(HashMap::new()),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Command line used for interactive shells (session shell and bridge).
    pub fn shell_command(&self) -> Vec<String> {
        vec![self.opts.shell.clone()]
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<ContainerSession>> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// Returns the live session for `session_id`, bringing its container up first
    /// if needed. Concurrent callers for the same unseen id share one creation.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        image: Option<&str>,
    ) -> Result<Arc<ContainerSession>, SessionError> {
        if let Some(session) = self.get(session_id) {
            return Ok(session);
        }

        let gate = self.creation_lock(session_id);
        let _guard = gate.lock().await;
        if let Some(session) = self.get(session_id) {
            return Ok(session);
        }

        let result = self.bring_up(session_id, image).await.map(Arc::new);
        if let Ok(session) = &result {
            self.live
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(session_id.to_string(), session.clone());
        }
        self.release_creation_lock(session_id, &gate);
        result
    }

    async fn bring_up(
        &self,
        session_id: &str,
        image: Option<&str>,
    ) -> Result<ContainerSession, SessionError> {
        let image = image
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or(&self.opts.image);
        let name = container_name(&self.opts.container_prefix, session_id);

        let handle = match self.runtime.get(&name).await? {
            Some(existing) => {
                if !existing.running {
                    self.runtime.start(&existing).await?;
                }
                tracing::info!(
                    target: "ghostgate.session",
                    session_id = %session_id,
                    container = %name,
                    was_running = existing.running,
                    "reusing existing container"
                );
                ContainerHandle {
                    running: true,
                    ..existing
                }
            }
            None => {
                let created = self
                    .runtime
                    .create(image, &self.shell_command(), true, &name)
                    .await?;
                self.runtime.start(&created).await?;
                tracing::info!(
                    target: "ghostgate.session",
                    session_id = %session_id,
                    container = %name,
                    image = %image,
                    "container created"
                );
                ContainerHandle {
                    running: true,
                    ..created
                }
            }
        };

        let pty = if self.opts.attach_pty {
            Some(self.runtime.exec(&handle, &self.shell_command(), true).await?)
        } else {
            None
        };

        Ok(ContainerSession::new(session_id, handle, image, pty))
    }

    /// Force-removes the session container. Also removes a container left over
    /// from an earlier process that this registry never attached to.
    pub async fn stop(&self, session_id: &str) -> Result<(), SessionError> {
        let gate = self.creation_lock(session_id);
        let _guard = gate.lock().await;
        let result = self.tear_down(session_id).await;
        self.release_creation_lock(session_id, &gate);
        result
    }

    async fn tear_down(&self, session_id: &str) -> Result<(), SessionError> {
        let removed = self
            .live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);

        let handle = match removed {
            Some(session) => Some(session.container.clone()),
            None => {
                let name = container_name(&self.opts.container_prefix, session_id);
                self.runtime.get(&name).await?
            }
        };
        let Some(handle) = handle else {
            return Err(SessionError::NotRunning(session_id.to_string()));
        };

        self.runtime.remove(&handle, true).await?;
        tracing::info!(
            target: "ghostgate.session",
            session_id = %session_id,
            container = %handle.name,
            "container removed"
        );
        Ok(())
    }

    pub async fn status(&self, session_id: &str) -> Result<Option<SessionStatus>, SessionError> {
        let Some(session) = self.get(session_id) else {
            return Ok(None);
        };
        let running = self
            .runtime
            .get(&session.container.name)
            .await?
            .map(|h| h.running)
            .unwrap_or(false);
        Ok(Some(session.status(running)))
    }

    /// Status of every session this registry has brought up, oldest first.
    pub async fn list(&self) -> Vec<SessionStatus> {
        let mut sessions: Vec<Arc<ContainerSession>> = self
            .live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);

        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            let running = match self.runtime.get(&session.container.name).await {
                Ok(found) => found.map(|h| h.running).unwrap_or(false),
                Err(e) => {
                    tracing::debug!(
                        target: "ghostgate.session",
                        session_id = %session.session_id,
                        error = %e,
                        "status lookup failed"
                    );
                    session.container.running
                }
            };
            out.push(session.status(running));
        }
        out
    }

    /// Removes every container this registry knows about. Returns how many were removed.
    pub async fn stop_all(&self) -> usize {
        let ids: Vec<String> = self
            .live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();

        let mut removed = 0;
        for id in ids {
            match self.stop(&id).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    target: "ghostgate.session",
                    session_id = %id,
                    error = %e,
                    "failed to remove container on shutdown"
                ),
            }
        }
        removed
    }

    fn creation_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.creating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    fn release_creation_lock(&self, session_id: &str, gate: &Arc<tokio::sync::Mutex<()>>) {
        let mut creating = self.creating.lock().unwrap_or_else(PoisonError::into_inner);
        // Only drop the entry nobody else is queued on.
        if let Some(current) = creating.get(session_id) {
            if Arc::ptr_eq(current, gate) && Arc::strong_count(gate) <= 2 {
                creating.remove(session_id);
            }
        }
    }
}

/// `<prefix>_<session id>` restricted to characters container engines accept.
/// Ids that had to be rewritten get a short hash suffix so distinct ids stay distinct.
pub fn container_name(prefix: &str, session_id: &str) -> String {
    let cleaned: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .take(48)
        .collect();

    if cleaned == session_id && !cleaned.is_empty() {
        format!("{prefix}_{cleaned}")
    } else {
        format!("{prefix}_{cleaned}-{:08x}", fnv1a(session_id.as_bytes()) as u32)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
