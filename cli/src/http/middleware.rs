use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};
use tracing::{info, warn};

pub fn create_middleware_stack(
    request_timeout: Duration,
) -> tower::layer::util::Stack<CorsLayer, TimeoutLayer> {
    tower::layer::util::Stack::new(create_cors_layer(), create_timeout_layer(request_timeout))
}

/// Browser access only from local pages.
fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            |origin: &HeaderValue, _| {
                origin
                    .to_str()
                    .map(is_local_origin)
                    .unwrap_or(false)
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

fn is_local_origin(origin: &str) -> bool {
    ["http://localhost", "https://localhost", "http://127.0.0.1", "https://127.0.0.1"]
        .iter()
        .any(|prefix| origin.starts_with(prefix))
}

/// An approve call that times out returns 408; the command keeps running and
/// its proposer still gets the result.
fn create_timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::new(timeout)
}

pub async fn request_logger(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        warn!(
            target: "ghostgate.http",
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request failed"
        );
    } else {
        info!(
            target: "ghostgate.http",
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}
