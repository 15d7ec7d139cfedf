use std::sync::Arc;

use crate::bridge::{PtyProvider, RegistryPtyProvider};
use crate::config::AppConfig;
use crate::error::SessionError;
use crate::exec::{CommandExecutor, ExecStrategy, ExecutionAdapter};
use crate::gatekeeper::{GateOptions, Gatekeeper};
use crate::protocol::{ListenerOptions, ProtocolListener};
use crate::runtime::ContainerRuntime;
use crate::session::{RegistryOptions, SessionRegistry, SessionStatus};

/// Everything a running gate needs, built once at startup and shared by the
/// socket listener and the control surface.
#[derive(Clone)]
pub struct AppContext {
    cfg: AppConfig,
    registry: Arc<SessionRegistry>,
    gatekeeper: Arc<Gatekeeper>,
    pty_provider: Arc<dyn PtyProvider>,
}

impl AppContext {
    pub fn new(
        cfg: AppConfig,
        runtime: Arc<dyn ContainerRuntime>,
        strategy: Arc<dyn ExecStrategy>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            runtime,
            RegistryOptions::from_config(&cfg.container, strategy.needs_pty()),
        ));
        let executor = Arc::new(ExecutionAdapter::new(registry.clone(), strategy));
        Self::assemble(cfg, registry, executor)
    }

    /// Same wiring with a caller-supplied executor in front of the gatekeeper.
    pub fn with_executor(
        cfg: AppConfig,
        runtime: Arc<dyn ContainerRuntime>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            runtime,
            RegistryOptions::from_config(&cfg.container, false),
        ));
        Self::assemble(cfg, registry, executor)
    }

    fn assemble(
        cfg: AppConfig,
        registry: Arc<SessionRegistry>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let gatekeeper = Arc::new(Gatekeeper::new(
            executor,
            GateOptions::from_config(&cfg.gatekeeper),
        ));
        let pty_provider: Arc<dyn PtyProvider> =
            Arc::new(RegistryPtyProvider::new(registry.clone()));
        Self {
            cfg,
            registry,
            gatekeeper,
            pty_provider,
        }
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    pub fn gatekeeper(&self) -> Arc<Gatekeeper> {
        self.gatekeeper.clone()
    }

    pub fn pty_provider(&self) -> Arc<dyn PtyProvider> {
        self.pty_provider.clone()
    }

    pub fn runtime_name(&self) -> String {
        self.registry.runtime().name().to_string()
    }

    pub async fn session_status(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionStatus>, SessionError> {
        self.registry.status(session_id).await
    }

    pub fn protocol_listener(&self) -> Arc<ProtocolListener> {
        Arc::new(ProtocolListener::new(
            self.gatekeeper.clone(),
            ListenerOptions::from_config(&self.cfg.listener),
        ))
    }
}
