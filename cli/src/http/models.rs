//! Request/response bodies and the error type of the control API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ghostgate_core::api::{describe_error, GateError, SessionError};
use serde::{Deserialize, Serialize};

/// Envelope for every JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyUpdate {
    #[serde(default)]
    pub allow_all: Option<bool>,
    #[serde(default)]
    pub paused: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub runtime: String,
    pub pending: usize,
    pub uptime_seconds: u64,
    pub requests_handled: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub session_id: String,
    pub stopped: bool,
}

#[derive(Debug)]
pub enum HttpServerError {
    NotFound(String),
    BridgeDisabled,
    Runtime(String),
    InvalidRequest(String),
}

impl HttpServerError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            HttpServerError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            HttpServerError::BridgeDisabled => (
                StatusCode::FORBIDDEN,
                "BRIDGE_DISABLED",
                "interactive bridge is disabled".to_string(),
            ),
            HttpServerError::Runtime(msg) => (StatusCode::BAD_GATEWAY, "RUNTIME_ERROR", msg.clone()),
            HttpServerError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
        }
    }
}

impl std::fmt::Display for HttpServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.parts().2)
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
            error_code: Some(code.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

impl From<GateError> for HttpServerError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::NotFound(_) => HttpServerError::NotFound(e.to_string()),
            GateError::Busy { .. } => HttpServerError::InvalidRequest(e.to_string()),
            GateError::Interrupted(_) => HttpServerError::Runtime(e.to_string()),
        }
    }
}

impl From<SessionError> for HttpServerError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotRunning(_) => HttpServerError::NotFound(e.to_string()),
            SessionError::Runtime(_) => HttpServerError::Runtime(describe_error(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghostgate_core::api::RuntimeError;

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (HttpServerError::from(GateError::NotFound(3)), StatusCode::NOT_FOUND),
            (
                HttpServerError::from(SessionError::NotRunning("s1".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                HttpServerError::from(SessionError::Runtime(RuntimeError::Unavailable(
                    "down".into(),
                ))),
                StatusCode::BAD_GATEWAY,
            ),
            (HttpServerError::BridgeDisabled, StatusCode::FORBIDDEN),
            (
                HttpServerError::from(GateError::Interrupted(4)),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn success_envelope_omits_error_fields() {
        let json = serde_json::to_value(ApiResponse::ok(1)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 1}));
    }
}
