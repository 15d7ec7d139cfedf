use std::future::ready;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use ghostgate_core::api::{run_bridge, ExecIo};

use crate::http::{models::HttpServerError, state::AppState};

/// GET /ws/sessions/:id: raw terminal access to a fresh shell in the
/// session container. Nothing typed here goes through the approval gate.
pub async fn ws_bridge_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, HttpServerError> {
    state.record_request("/ws/sessions/:id");
    if !state.ctx.cfg().bridge.enabled {
        return Err(HttpServerError::BridgeDisabled);
    }
    let ws = ws.map_err(|e| HttpServerError::InvalidRequest(e.body_text()))?;

    let pty = match state.ctx.pty_provider().open(&session_id).await {
        Ok(pty) => pty,
        Err(e) => {
            state.record_error();
            return Err(e.into());
        }
    };
    tracing::info!(target: "ghostgate.bridge", session_id = %session_id, "bridge opened");
    Ok(ws
        .on_upgrade(move |socket| serve_socket(state, session_id, pty, socket))
        .into_response())
}

async fn serve_socket(state: AppState, session_id: String, pty: ExecIo, socket: WebSocket) {
    let mut shutdown = state.shutdown_tx.subscribe();
    let (sink, stream) = socket.split();

    let inbound = stream
        .take_while(|msg| ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(|msg| {
            ready(match msg {
                Ok(Message::Binary(data)) => Some(Bytes::from(data)),
                Ok(Message::Text(text)) => Some(Bytes::from(text)),
                _ => None,
            })
        })
        .take_until(Box::pin(async move {
            let _ = shutdown.recv().await;
        }));
    let outbound =
        sink.with(|chunk: Bytes| ready(Ok::<_, axum::Error>(Message::Binary(chunk.to_vec()))));

    run_bridge(&session_id, pty, inbound, Box::pin(outbound)).await;
}
