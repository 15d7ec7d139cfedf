use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use ghostgate_core::api::{GatePolicy, PendingCommand, SessionStatus};

use crate::http::{
    bridge::ws_bridge_handler,
    events::events_handler,
    models::*,
    state::AppState,
};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/pending", get(pending_handler))
        .route("/api/v1/history", get(history_handler))
        .route("/api/v1/pending/:id/approve", post(approve_handler))
        .route("/api/v1/pending/:id/reject", post(reject_handler))
        .route("/api/v1/policy", get(policy_handler).put(update_policy_handler))
        .route("/api/v1/sessions", get(sessions_handler))
        .route("/api/v1/sessions/:id", get(session_handler))
        .route("/api/v1/sessions/:id/start", post(start_session_handler))
        .route("/api/v1/sessions/:id/stop", post(stop_session_handler))
        .route("/api/v1/events", get(events_handler))
        .route("/api/v1/shutdown", post(shutdown_handler))
        .route("/ws/sessions/:id", get(ws_bridge_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    state.record_request("/health");
    let (uptime_seconds, requests_handled) = {
        let stats = state
            .stats
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        (stats.uptime_seconds(), stats.requests_total)
    };

    Json(HealthResponse {
        status: "healthy".into(),
        runtime: state.ctx.runtime_name(),
        pending: state.ctx.gatekeeper().pending_count(),
        uptime_seconds,
        requests_handled,
        timestamp: Local::now().to_rfc3339(),
    })
}

async fn pending_handler(State(state): State<AppState>) -> Json<ApiResponse<Vec<PendingCommand>>> {
    state.record_request("/api/v1/pending");
    Json(ApiResponse::ok(state.ctx.gatekeeper().snapshot()))
}

async fn history_handler(State(state): State<AppState>) -> Json<ApiResponse<Vec<PendingCommand>>> {
    state.record_request("/api/v1/history");
    Json(ApiResponse::ok(state.ctx.gatekeeper().history()))
}

async fn decide(
    state: &AppState,
    id: u64,
    approve: bool,
) -> Result<Json<ApiResponse<PendingCommand>>, HttpServerError> {
    match state.ctx.gatekeeper().decide(id, approve).await {
        Ok(entry) => Ok(Json(ApiResponse::ok(entry))),
        Err(e) => {
            state.record_error();
            Err(e.into())
        }
    }
}

/// Runs the command before answering; the response carries its output.
async fn approve_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ApiResponse<PendingCommand>>, HttpServerError> {
    state.record_request("/api/v1/pending/approve");
    decide(&state, id, true).await
}

async fn reject_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ApiResponse<PendingCommand>>, HttpServerError> {
    state.record_request("/api/v1/pending/reject");
    decide(&state, id, false).await
}

async fn policy_handler(State(state): State<AppState>) -> Json<ApiResponse<GatePolicy>> {
    state.record_request("/api/v1/policy");
    Json(ApiResponse::ok(state.ctx.gatekeeper().policy()))
}

async fn update_policy_handler(
    State(state): State<AppState>,
    Json(req): Json<PolicyUpdate>,
) -> Json<ApiResponse<GatePolicy>> {
    state.record_request("/api/v1/policy");
    let policy = state
        .ctx
        .gatekeeper()
        .update_policy(req.allow_all, req.paused);
    Json(ApiResponse::ok(policy))
}

async fn sessions_handler(State(state): State<AppState>) -> Json<ApiResponse<Vec<SessionStatus>>> {
    state.record_request("/api/v1/sessions");
    Json(ApiResponse::ok(state.ctx.registry().list().await))
}

async fn session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SessionStatus>>, HttpServerError> {
    state.record_request("/api/v1/sessions/:id");
    match state.ctx.session_status(&id).await {
        Ok(Some(status)) => Ok(Json(ApiResponse::ok(status))),
        Ok(None) => Err(HttpServerError::NotFound(format!("no session {id}"))),
        Err(e) => {
            state.record_error();
            Err(e.into())
        }
    }
}

async fn start_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<StartSessionRequest>>,
) -> Result<Json<ApiResponse<SessionStatus>>, HttpServerError> {
    state.record_request("/api/v1/sessions/:id/start");
    let image = body.and_then(|Json(req)| req.image);
    let registry = state.ctx.registry();
    let result = async {
        registry.get_or_create(&id, image.as_deref()).await?;
        registry.status(&id).await
    }
    .await;

    match result {
        Ok(Some(status)) => Ok(Json(ApiResponse::ok(status))),
        Ok(None) => Err(HttpServerError::NotFound(format!("no session {id}"))),
        Err(e) => {
            state.record_error();
            Err(e.into())
        }
    }
}

async fn stop_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<StopResponse>>, HttpServerError> {
    state.record_request("/api/v1/sessions/:id/stop");
    match state.ctx.registry().stop(&id).await {
        Ok(()) => Ok(Json(ApiResponse::ok(StopResponse {
            session_id: id,
            stopped: true,
        }))),
        Err(e) => {
            state.record_error();
            Err(e.into())
        }
    }
}

async fn shutdown_handler(State(state): State<AppState>) -> Json<ApiResponse<String>> {
    state.record_request("/api/v1/shutdown");
    let _ = state.shutdown_tx.send(());
    Json(ApiResponse::ok("Shutdown signal sent".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use ghostgate_core::api::{AppConfig, AppContext, CommandStatus, Submission};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use testkit::{FakeExecutor, FakeRuntime};
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    fn create_test_state(bridge: bool) -> (AppState, Arc<FakeRuntime>) {
        let mut cfg = AppConfig::default();
        cfg.bridge.enabled = bridge;
        let rt = FakeRuntime::new();
        let ctx = AppContext::with_executor(cfg, rt.clone(), FakeExecutor::new());
        let (shutdown_tx, _) = broadcast::channel(1);
        (AppState::new(ctx, shutdown_tx), rt)
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = create_router(state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn queue(state: &AppState, session: &str, command: &str) -> u64 {
        match state.ctx.gatekeeper().submit(session, command).await.unwrap() {
            Submission::Queued(ticket) => ticket.id,
            Submission::Settled(v) => panic!("expected queued entry, got {v:?}"),
        }
    }

    #[tokio::test]
    async fn test_health_handler() {
        let (state, _rt) = create_test_state(false);
        let Json(health) = health_handler(State(state.clone())).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.runtime, "fake");
        assert_eq!(health.pending, 0);
        assert_eq!(health.requests_handled, 1);
    }

    #[tokio::test]
    async fn test_pending_and_approve() {
        let (state, _rt) = create_test_state(false);
        let id = queue(&state, "s1", "echo hi").await;

        let (status, body) = call(&state, "GET", "/api/v1/pending", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["command_text"], "echo hi");
        assert_eq!(body["data"][0]["status"], "pending");

        let (status, body) = call(&state, "POST", &format!("/api/v1/pending/{id}/approve"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "approved");
        assert_eq!(body["data"]["output"], "hi\n");

        let (status, body) = call(&state, "POST", &format!("/api/v1/pending/{id}/approve"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_code"], "NOT_FOUND");

        let (_, body) = call(&state, "GET", "/api/v1/history", None).await;
        assert_eq!(body["data"][0]["id"], id);
    }

    #[tokio::test]
    async fn test_reject_handler() {
        let (state, _rt) = create_test_state(false);
        let id = queue(&state, "s1", "rm -rf /").await;

        let result = reject_handler(State(state.clone()), Path(id)).await.unwrap();
        let entry = result.0.data.unwrap();
        assert_eq!(entry.status, CommandStatus::Rejected);
        assert_eq!(entry.output.as_deref(), Some(""));
        assert!(state.ctx.gatekeeper().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_policy_update_is_partial() {
        let (state, _rt) = create_test_state(false);

        let (status, body) = call(&state, "PUT", "/api/v1/policy", Some(r#"{"paused":true}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], serde_json::json!({"allow_all": false, "paused": true}));

        call(&state, "PUT", "/api/v1/policy", Some(r#"{"allow_all":true}"#)).await;
        let (_, body) = call(&state, "GET", "/api/v1/policy", None).await;
        assert_eq!(body["data"], serde_json::json!({"allow_all": true, "paused": true}));
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (state, rt) = create_test_state(false);

        let (status, _) = call(&state, "GET", "/api/v1/sessions/s1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &state,
            "POST",
            "/api/v1/sessions/s1/start",
            Some(r#"{"image":"alpine:latest"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["container_name"], "ghostshell_s1");
        assert_eq!(body["data"]["image"], "alpine:latest");
        assert_eq!(rt.image_of("ghostshell_s1").as_deref(), Some("alpine:latest"));

        let (status, _) = call(&state, "POST", "/api/v1/sessions/s2/start", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&state, "GET", "/api/v1/sessions", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (status, body) = call(&state, "POST", "/api/v1/sessions/s1/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["stopped"], true);

        let (status, body) = call(&state, "POST", "/api/v1/sessions/s1/stop", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_runtime_failure_is_bad_gateway() {
        let (state, rt) = create_test_state(false);
        rt.set_unavailable(true);

        let (status, body) = call(&state, "POST", "/api/v1/sessions/s1/start", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error_code"], "RUNTIME_ERROR");
        assert!(body["error"].as_str().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_bridge_disabled_is_forbidden() {
        let (state, _rt) = create_test_state(false);
        let (status, body) = call(&state, "GET", "/ws/sessions/s1", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error_code"], "BRIDGE_DISABLED");
    }

    #[tokio::test]
    async fn test_shutdown_handler() {
        let (state, _rt) = create_test_state(false);
        let mut rx = state.shutdown_tx.subscribe();

        let (status, body) = call(&state, "POST", "/api/v1/shutdown", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(rx.try_recv().is_ok());
    }
}
