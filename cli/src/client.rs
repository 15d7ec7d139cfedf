//! HTTP client for the control API, used by the operator subcommands.

use std::time::Duration;

use futures::{Stream, StreamExt};
use ghostgate_core::api::{CliError, GateEvent, GatePolicy, PendingCommand, SessionStatus};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::http::models::{
    ApiResponse, HealthResponse, PolicyUpdate, StartSessionRequest, StopResponse,
};

pub struct ControlClient {
    client: Client,
    base_url: String,
}

impl ControlClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CliError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .map_err(|e| CliError::Http(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, CliError> {
        let resp = req
            .send()
            .await
            .map_err(|e| CliError::Http(format!("cannot reach control API at {}: {e}", self.base_url)))?;
        let status = resp.status();
        let body: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| CliError::Http(format!("unexpected response ({status}): {e}")))?;

        if !body.success {
            let message = body.error.unwrap_or_else(|| status.to_string());
            return Err(CliError::Http(match body.error_code {
                Some(code) => format!("{message} [{code}]"),
                None => message,
            }));
        }
        body.data
            .ok_or_else(|| CliError::Http("response carried no data".to_string()))
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, CliError> {
        self.send(self.request(method, path).json(body)).await
    }

    pub async fn health(&self) -> Result<HealthResponse, CliError> {
        let resp = self
            .request(Method::GET, "/health")
            .send()
            .await
            .map_err(|e| CliError::Http(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| CliError::Http(e.to_string()))
    }

    pub async fn pending(&self) -> Result<Vec<PendingCommand>, CliError> {
        self.send(self.request(Method::GET, "/api/v1/pending")).await
    }

    pub async fn history(&self) -> Result<Vec<PendingCommand>, CliError> {
        self.send(self.request(Method::GET, "/api/v1/history")).await
    }

    pub async fn decide(&self, id: u64, approve: bool) -> Result<PendingCommand, CliError> {
        let action = if approve { "approve" } else { "reject" };
        self.send(self.request(Method::POST, &format!("/api/v1/pending/{id}/{action}")))
            .await
    }

    pub async fn policy(&self) -> Result<GatePolicy, CliError> {
        self.send(self.request(Method::GET, "/api/v1/policy")).await
    }

    pub async fn update_policy(
        &self,
        allow_all: Option<bool>,
        paused: Option<bool>,
    ) -> Result<GatePolicy, CliError> {
        self.send_json(
            Method::PUT,
            "/api/v1/policy",
            &PolicyUpdate { allow_all, paused },
        )
        .await
    }

    pub async fn sessions(&self) -> Result<Vec<SessionStatus>, CliError> {
        self.send(self.request(Method::GET, "/api/v1/sessions")).await
    }

    pub async fn session(&self, id: &str) -> Result<SessionStatus, CliError> {
        self.send(self.request(Method::GET, &format!("/api/v1/sessions/{id}")))
            .await
    }

    pub async fn start_session(
        &self,
        id: &str,
        image: Option<String>,
    ) -> Result<SessionStatus, CliError> {
        self.send_json(
            Method::POST,
            &format!("/api/v1/sessions/{id}/start"),
            &StartSessionRequest { image },
        )
        .await
    }

    pub async fn stop_session(&self, id: &str) -> Result<StopResponse, CliError> {
        self.send(self.request(Method::POST, &format!("/api/v1/sessions/{id}/stop")))
            .await
    }

    pub async fn shutdown(&self) -> Result<String, CliError> {
        self.send(self.request(Method::POST, "/api/v1/shutdown")).await
    }

    /// Follows `/api/v1/events`. Comments, keep-alives and unknown events are
    /// skipped.
    pub async fn events(
        &self,
    ) -> Result<impl Stream<Item = Result<GateEvent, CliError>>, CliError> {
        // The default client timeout would cut a long-lived stream.
        let resp = Client::new()
            .get(format!("{}/api/v1/events", self.base_url))
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| CliError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| CliError::Http(e.to_string()))?;

        let mut body = resp.bytes_stream();
        Ok(async_stream::stream! {
            let mut buf = String::new();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(CliError::Http(e.to_string()));
                        break;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(end) = buf.find("\n\n") {
                    let frame: String = buf.drain(..end + 2).collect();
                    if let Some(ev) = parse_sse_frame(&frame) {
                        yield Ok(ev);
                    }
                }
            }
        })
    }
}

fn parse_sse_frame(frame: &str) -> Option<GateEvent> {
    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|d| d.strip_prefix(' ').unwrap_or(d))
        .collect();
    if data.is_empty() {
        return None;
    }
    serde_json::from_str(&data.join("\n")).ok()
}
