use std::path::Path;
use std::sync::Arc;

use ghostgate_core::api::{AppConfig, BoundListener, Endpoint, ProtocolListener};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default config with the proposer socket inside `dir`.
pub fn socket_config(dir: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    if cfg!(unix) {
        cfg.listener.listen = dir.join("gate.sock").display().to_string();
    } else {
        cfg.listener.listen = "tcp://127.0.0.1:0".to_string();
    }
    cfg
}

pub struct RunningListener {
    pub endpoint: Endpoint,
    pub shutdown: broadcast::Sender<()>,
    pub task: JoinHandle<std::io::Result<()>>,
}

impl RunningListener {
    /// Signals shutdown and waits for the listener to finish.
    pub async fn stop(self) -> std::io::Result<()> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }
}

/// Binds `endpoint` and serves it on a background task.
pub async fn spawn_listener(
    listener: Arc<ProtocolListener>,
    endpoint: &Endpoint,
) -> std::io::Result<RunningListener> {
    let bound = BoundListener::bind(endpoint).await?;
    let endpoint = bound.local_endpoint()?;
    let (shutdown, rx) = broadcast::channel(1);
    let task = tokio::spawn(listener.serve(bound, rx));
    Ok(RunningListener {
        endpoint,
        shutdown,
        task,
    })
}
