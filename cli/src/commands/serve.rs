use std::net::SocketAddr;

use ghostgate_core::api::{AppConfig, AppContext, BoundListener, CliError, Endpoint};
use ghostgate_plugins::factory::{build_runtime, build_strategy};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::commands::cli::ServeArgs;
use crate::http::{server, AppState};

pub fn apply_serve_args(cfg: &mut AppConfig, args: &ServeArgs) {
    if let Some(listen) = &args.listen {
        cfg.listener.listen = listen.clone();
    }
    if let Some(strategy) = args.strategy {
        cfg.execution.strategy = strategy.into();
    }
    if let Some(mode) = args.approval_mode {
        cfg.gatekeeper.approval_mode = mode.into();
    }
    if args.allow_all {
        cfg.gatekeeper.allow_all = true;
    }
    if args.paused {
        cfg.gatekeeper.paused = true;
    }
    if args.bridge {
        cfg.bridge.enabled = true;
    }
    if let Some(port) = args.control_port {
        cfg.control.port = port;
    }
}

pub async fn handle_serve(args: ServeArgs, mut cfg: AppConfig) -> Result<(), CliError> {
    apply_serve_args(&mut cfg, &args);
    cfg.validate()?;

    let runtime = build_runtime(&cfg)
        .await
        .map_err(|e| CliError::Command(format!("{e:#}")))?;
    let strategy = build_strategy(&cfg);
    tracing::info!(
        runtime = runtime.name(),
        strategy = strategy.name(),
        approval_mode = ?cfg.gatekeeper.approval_mode,
        bridge = cfg.bridge.enabled,
        "starting ghostgate"
    );

    let ctx = AppContext::new(cfg, runtime, strategy);
    BoundGate::bind(ctx).await?.run().await
}

/// Proposer socket and control API, both bound and ready to serve.
pub struct BoundGate {
    ctx: AppContext,
    proposals: BoundListener,
    control: TcpListener,
    endpoint: Endpoint,
    control_addr: SocketAddr,
}

impl BoundGate {
    pub async fn bind(ctx: AppContext) -> Result<Self, CliError> {
        let cfg = ctx.cfg();
        let endpoint = Endpoint::parse(&cfg.listener.listen)?;
        let proposals = BoundListener::bind(&endpoint)
            .await
            .map_err(|source| CliError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let endpoint = proposals
            .local_endpoint()
            .map_err(|source| CliError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let control_addr = control_addr(cfg)?;
        let control = TcpListener::bind(control_addr)
            .await
            .map_err(|source| CliError::Bind {
                endpoint: control_addr.to_string(),
                source,
            })?;
        let control_addr = control.local_addr().map_err(|source| CliError::Bind {
            endpoint: control_addr.to_string(),
            source,
        })?;

        Ok(Self {
            ctx,
            proposals,
            control,
            endpoint,
            control_addr,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// Runs until the control API shuts down, then stops the listener, which
    /// rejects everything still pending.
    pub async fn run(self) -> Result<(), CliError> {
        let (shutdown_tx, _) = broadcast::channel(4);
        let listener = self.ctx.protocol_listener();
        let listener_task = tokio::spawn(listener.serve(self.proposals, shutdown_tx.subscribe()));

        let state = AppState::new(self.ctx.clone(), shutdown_tx.clone());
        let served = server::serve(self.control, state).await;

        let _ = shutdown_tx.send(());
        match listener_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "proposal listener failed"),
            Err(e) => tracing::warn!(error = %e, "proposal listener task panicked"),
        }

        if self.ctx.cfg().container.remove_on_exit {
            let removed = self.ctx.registry().stop_all().await;
            tracing::info!(target: "ghostgate.session", removed, "removed session containers");
        }

        served.map_err(|e| CliError::Command(format!("control API failed: {e}")))
    }
}

fn control_addr(cfg: &AppConfig) -> Result<SocketAddr, CliError> {
    let host = if cfg.control.host == "localhost" {
        "127.0.0.1"
    } else {
        cfg.control.host.as_str()
    };
    let addr: SocketAddr = format!("{host}:{}", cfg.control.port)
        .parse()
        .map_err(|e| CliError::Command(format!("invalid control address {host}: {e}")))?;
    if !addr.ip().is_loopback() {
        return Err(CliError::Command(format!(
            "control API must bind a loopback address, got {}",
            addr.ip()
        )));
    }
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ControlClient;
    use crate::commands::cli::StrategyArg;
    use ghostgate_core::api::{
        propose, CommandStatus, ExecStrategyKind, Framing, ProposalRequest,
    };
    use std::time::Duration;
    use testkit::{FakeExecutor, FakeRuntime};

    #[test]
    fn serve_args_override_config() {
        let mut cfg = AppConfig::default();
        let args = ServeArgs {
            strategy: Some(StrategyArg::PtyRelay),
            bridge: true,
            control_port: Some(9100),
            ..Default::default()
        };
        apply_serve_args(&mut cfg, &args);
        assert_eq!(cfg.execution.strategy, ExecStrategyKind::PtyRelay);
        assert!(cfg.bridge.enabled);
        assert_eq!(cfg.control.port, 9100);
        assert!(!cfg.gatekeeper.allow_all);
    }

    #[test]
    fn control_api_stays_on_loopback() {
        let mut cfg = AppConfig::default();
        assert!(control_addr(&cfg).unwrap().ip().is_loopback());
        cfg.control.host = "localhost".into();
        assert!(control_addr(&cfg).is_ok());
        cfg.control.host = "0.0.0.0".into();
        assert!(matches!(control_addr(&cfg), Err(CliError::Command(_))));
    }

    #[tokio::test]
    async fn gate_round_trip_through_control_api() {
        let mut cfg = AppConfig::default();
        cfg.listener.listen = "tcp://127.0.0.1:0".into();
        cfg.control.port = 0;
        let ctx = AppContext::with_executor(cfg, FakeRuntime::new(), FakeExecutor::new());

        let gate = BoundGate::bind(ctx).await.unwrap();
        let endpoint = gate.endpoint().clone();
        let client = ControlClient::new(
            &format!("http://{}", gate.control_addr()),
            Duration::from_secs(5),
        )
        .unwrap();
        let running = tokio::spawn(gate.run());

        let proposer = tokio::spawn(async move {
            propose(&endpoint, &ProposalRequest::new("s1", "echo hi"), Framing::Line).await
        });

        let id = loop {
            if let Some(entry) = client.pending().await.unwrap().first() {
                break entry.id;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        let entry = client.decide(id, true).await.unwrap();
        assert_eq!(entry.output.as_deref(), Some("hi\n"));

        let verdict = proposer.await.unwrap().unwrap();
        assert_eq!(verdict.status, CommandStatus::Approved);
        assert_eq!(verdict.output, "hi\n");

        client.shutdown().await.unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(10), running)
            .await
            .unwrap()
            .unwrap();
        assert!(stopped.is_ok());
    }
}
