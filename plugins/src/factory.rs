use std::sync::Arc;

use anyhow::{Context, Result};

use ghostgate_core::api::{AppConfig, ContainerRuntime, ExecStrategy, ExecStrategyKind};

use crate::exec::{OneShotStrategy, PtyRelayStrategy};
use crate::runtime::DockerRuntime;

/// Connects to the local Docker daemon. An unreachable daemon is only
/// warned about: commands will report the failure as their output.
pub async fn build_runtime(_cfg: &AppConfig) -> Result<Arc<dyn ContainerRuntime>> {
    let docker = DockerRuntime::connect().context("failed to configure docker client")?;
    if let Err(e) = docker.ping().await {
        tracing::warn!(target: "ghostgate.session", error = %e, "docker daemon not reachable");
    }
    Ok(Arc::new(docker))
}

pub fn build_strategy(cfg: &AppConfig) -> Arc<dyn ExecStrategy> {
    match cfg.execution.strategy {
        ExecStrategyKind::OneShot => Arc::new(OneShotStrategy::from_config(&cfg.execution)),
        ExecStrategyKind::PtyRelay => Arc::new(PtyRelayStrategy::from_config(
            &cfg.container.shell,
            &cfg.execution,
        )),
    }
}
