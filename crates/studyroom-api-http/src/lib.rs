// # StudyRoom HTTP API Client
//
// `RemoteApi` implementation against the StudyRoom backend REST API.
//
// ## Endpoints
//
// - `POST /api/v1/attendance` — create an attendance record
// - `PUT  /api/v1/attendance/:id` — update an attendance record
// - `GET  /api/v1/students?is_active=...&search=...` — roster fetch
// - `POST/PUT/DELETE /api/v1/{students,attendance,payments}` — generic
//   queue-replay dispatch
//
// Every response carries the backend's `{ success, data?, error? }`
// envelope; `success: false` is an error even on HTTP 200.
//
// ## Trust boundaries
//
// This client is a stateless single-shot caller:
// - No retry logic or backoff (owned by the sync engine)
// - No access to the local store (owned by the engine)
// - HTTP timeout configured here (10 seconds), not in the engine

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use studyroom_core::model::{CachedStudent, EntityKind, QueueAction};
use studyroom_core::traits::{ApiAck, AttendanceUpsert, RemoteApi, StudentFilter};
use studyroom_core::{Error, Result};

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the StudyRoom backend
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteApi {
    /// Create a new client against the given base URL
    /// (e.g. `https://studyroom.example.com`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(Error::config("API base URL must not be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode(&self, endpoint: &str, response: reqwest::Response) -> Result<ApiAck> {
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(status_error(endpoint, status, &text));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::api(endpoint, format!("failed to parse response: {}", e)))?;
        parse_envelope(endpoint, json)
    }

    async fn send_json(
        &self,
        builder: reqwest::RequestBuilder,
        endpoint: &str,
        body: &Value,
    ) -> Result<ApiAck> {
        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| Error::api(endpoint, format!("HTTP request failed: {}", e)))?;
        self.decode(endpoint, response).await
    }
}

/// Map an HTTP error status to an API error
fn status_error(endpoint: &str, status: u16, text: &str) -> Error {
    match status {
        401 | 403 => Error::api(
            endpoint,
            format!("authentication failed (status {})", status),
        ),
        404 => Error::not_found(format!("{} returned 404", endpoint)),
        429 => Error::api(
            endpoint,
            format!("rate limit exceeded, retry later (status {})", status),
        ),
        500..=599 => Error::api(
            endpoint,
            format!("server error (transient): {} - {}", status, text),
        ),
        _ => Error::api(endpoint, format!("request failed: {} - {}", status, text)),
    }
}

/// Unwrap the backend's `{ success, data?, error? }` envelope
fn parse_envelope(endpoint: &str, json: Value) -> Result<ApiAck> {
    if json.get("success").and_then(Value::as_bool) != Some(true) {
        let message = json
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("backend reported failure without an error message")
            .to_string();
        return Err(Error::api(endpoint, message));
    }

    let data = json.get("data").cloned().unwrap_or(Value::Null);
    let remote_id = data.get("id").and_then(Value::as_u64);
    Ok(ApiAck { remote_id, data })
}

/// Resource path for an entity kind
fn entity_path(entity: EntityKind) -> &'static str {
    match entity {
        EntityKind::Attendance => "/api/v1/attendance",
        EntityKind::Student => "/api/v1/students",
        EntityKind::Payment => "/api/v1/payments",
    }
}

/// Map a queue intent to `(method, path)`. Update and delete need the
/// target id in the payload.
fn route(entity: EntityKind, action: QueueAction, payload: &Value) -> Result<(&'static str, String)> {
    let base = entity_path(entity);
    match action {
        QueueAction::Create => Ok(("POST", base.to_string())),
        QueueAction::Update | QueueAction::Delete => {
            let id = payload
                .get("id")
                .and_then(Value::as_u64)
                .ok_or_else(|| {
                    Error::invalid_input(format!(
                        "{:?} intent for {} is missing the target id",
                        action, base
                    ))
                })?;
            let method = if action == QueueAction::Update {
                "PUT"
            } else {
                "DELETE"
            };
            Ok((method, format!("{}/{}", base, id)))
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn mark_attendance(&self, body: &AttendanceUpsert) -> Result<ApiAck> {
        let endpoint = "/api/v1/attendance";
        tracing::debug!(student_id = body.student_id, "POST {}", endpoint);

        let payload = serde_json::to_value(body)?;
        self.send_json(self.client.post(self.url(endpoint)), endpoint, &payload)
            .await
    }

    async fn update_attendance(&self, id: u64, body: &AttendanceUpsert) -> Result<ApiAck> {
        let endpoint = format!("/api/v1/attendance/{}", id);
        tracing::debug!("PUT {}", endpoint);

        let payload = serde_json::to_value(body)?;
        self.send_json(self.client.put(self.url(&endpoint)), &endpoint, &payload)
            .await
    }

    async fn get_students(&self, filter: &StudentFilter) -> Result<Vec<CachedStudent>> {
        let endpoint = "/api/v1/students";
        tracing::debug!(?filter, "GET {}", endpoint);

        let response = self
            .client
            .get(self.url(endpoint))
            .query(filter)
            .send()
            .await
            .map_err(|e| Error::api(endpoint, format!("HTTP request failed: {}", e)))?;

        let ack = self.decode(endpoint, response).await?;
        serde_json::from_value(ack.data)
            .map_err(|e| Error::api(endpoint, format!("unexpected roster payload: {}", e)))
    }

    async fn submit(
        &self,
        entity: EntityKind,
        action: QueueAction,
        payload: &Value,
    ) -> Result<ApiAck> {
        let (method, path) = route(entity, action, payload)?;
        tracing::debug!("{} {}", method, path);

        let url = self.url(&path);
        match method {
            "POST" => self.send_json(self.client.post(url), &path, payload).await,
            "PUT" => self.send_json(self.client.put(url), &path, payload).await,
            _ => {
                let response = self
                    .client
                    .delete(url)
                    .send()
                    .await
                    .map_err(|e| Error::api(&path, format!("HTTP request failed: {}", e)))?;
                self.decode(&path, response).await
            }
        }
    }
}
