use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::http::state::AppState;

/// GET /api/v1/events: gate events as server-sent events named after the
/// event kind, with the JSON event as data. Ends when the server shuts down.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    state.record_request("/api/v1/events");
    let mut events = state.ctx.gatekeeper().subscribe();
    let mut shutdown = state.shutdown_tx.subscribe();

    let stream = async_stream::stream! {
        loop {
            let received = tokio::select! {
                ev = events.recv() => ev,
                _ = shutdown.recv() => break,
            };
            match received {
                Ok(ev) => match Event::default().event(ev.name()).json_data(&ev) {
                    Ok(event) => yield Ok(event),
                    Err(e) => {
                        tracing::warn!(target: "ghostgate.http", error = %e, "failed to encode gate event");
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    yield Ok(Event::default().event("lagged").data(skipped.to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::routes::create_router;
    use axum::{body::Body, http::Request};
    use futures::StreamExt;
    use ghostgate_core::api::{AppConfig, AppContext};
    use std::time::Duration;
    use testkit::{FakeExecutor, FakeRuntime};
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    #[tokio::test]
    async fn streams_gate_events_until_shutdown() {
        let ctx = AppContext::with_executor(
            AppConfig::default(),
            FakeRuntime::new(),
            FakeExecutor::new(),
        );
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = AppState::new(ctx.clone(), shutdown_tx.clone());

        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        ctx.gatekeeper().update_policy(None, Some(true));
        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8_lossy(&chunk);
        assert!(text.contains("event: policy_changed"));
        assert!(text.contains(r#""paused":true"#));

        shutdown_tx.send(()).unwrap();
        let rest = tokio::time::timeout(Duration::from_secs(5), async {
            while body.next().await.is_some() {}
        })
        .await;
        assert!(rest.is_ok());
    }
}
