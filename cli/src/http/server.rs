use std::time::Duration;

use axum::{middleware, Router};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use crate::http::{
    middleware::{create_middleware_stack, request_logger},
    routes::create_router,
    AppState,
};

pub fn build_app(state: AppState) -> Router {
    let timeout = Duration::from_millis(state.ctx.cfg().control.request_timeout_ms);
    create_router(state)
        .layer(middleware::from_fn(request_logger))
        .layer(create_middleware_stack(timeout))
}

/// Serves the control API on `listener` until Ctrl+C, SIGTERM or
/// `POST /api/v1/shutdown`.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    let app = build_app(state);

    info!(target: "ghostgate.http", "control API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!(target: "ghostgate.http", "Received Ctrl+C signal");
                }
                _ = shutdown_rx.recv() => {
                    info!(target: "ghostgate.http", "Received shutdown signal from API");
                }
                _ = wait_for_sigterm() => {
                    info!(target: "ghostgate.http", "Received SIGTERM signal");
                }
            }
        })
        .await?;

    info!(target: "ghostgate.http", "control API stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(target: "ghostgate.http", error = %e, "cannot listen for SIGTERM");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghostgate_core::api::{AppConfig, AppContext};
    use testkit::{FakeExecutor, FakeRuntime};
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_server_lifecycle() {
        let ctx = AppContext::with_executor(
            AppConfig::default(),
            FakeRuntime::new(),
            FakeExecutor::new(),
        );
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = AppState::new(ctx, shutdown_tx.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, state));

        let health: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");

        let _ = shutdown_tx.send(());
        let result = tokio::time::timeout(Duration::from_secs(5), server).await;
        assert!(result.is_ok(), "Server should shutdown gracefully");
        assert!(result.unwrap().unwrap().is_ok());
    }
}
