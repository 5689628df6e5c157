//! Event ingestion API
//!
//! Thin surface over the two backend endpoints: `POST /ingest/events` for
//! recording a normalized event and `POST /ingest/health` for the startup
//! probe. Authentication uses the API-key header when one is configured;
//! the project dsn key always travels in the body.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::http::{AuthMode, HttpClient, RequestOptions};
use crate::types::NormalizedEvent;

/// Longest accepted `x-idempotency-key` value.
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Payload for sending an event to the backend.
#[derive(Debug)]
pub struct IngestRequest {
    /// Project dsn key; falls back to the API default when absent.
    pub dsn_key: Option<String>,
    pub event: NormalizedEvent,
    /// Deduplication key forwarded as `x-idempotency-key`; at most 128
    /// characters, rejected before any network call otherwise.
    pub idempotency_key: Option<String>,
    /// Forwarded as `x-sdk-version`.
    pub sdk_version: Option<String>,
}

impl IngestRequest {
    pub fn new(event: NormalizedEvent) -> Self {
        IngestRequest {
            dsn_key: None,
            event,
            idempotency_key: None,
            sdk_version: None,
        }
    }
}

/// Response after recording an event.
#[derive(Debug, Deserialize)]
pub struct IngestResponse {
    /// Assigned event identifier.
    pub event_id: String,
}

/// Response from the ingestion health endpoint.
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Event ingestion API client.
#[derive(Clone)]
pub struct IngestApi {
    http: Arc<HttpClient>,
    default_dsn_key: Option<String>,
}

impl IngestApi {
    /// Creates the ingestion client with an optional default dsn key.
    pub fn new(http: Arc<HttpClient>, default_dsn_key: Option<String>) -> Self {
        IngestApi {
            http,
            default_dsn_key,
        }
    }

    /// Sends an event to the ingestion backend.
    pub async fn event(&self, input: IngestRequest) -> Result<IngestResponse> {
        let dsn_key = self.resolve_dsn_key(input.dsn_key.as_deref())?;

        if let Some(key) = &input.idempotency_key {
            if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                return Err(Error::Validation(format!(
                    "idempotency_key must be at most {} characters",
                    MAX_IDEMPOTENCY_KEY_LEN
                )));
            }
        }

        let mut headers = Vec::new();
        if let Some(key) = input.idempotency_key {
            headers.push(("x-idempotency-key".to_string(), key));
        }
        if let Some(version) = input.sdk_version {
            headers.push(("x-sdk-version".to_string(), version));
        }

        let body = json!({
            "dsnKey": dsn_key,
            "event": input.event,
        });

        self.http
            .post_json(
                RequestOptions::post("/ingest/events", body)
                    .with_auth(self.auth_mode())
                    .with_headers(headers),
            )
            .await
    }

    /// Checks ingestion health for a project.
    ///
    /// Bypasses the health-probe gate so the startup probe itself can use
    /// this endpoint.
    pub async fn health(&self, dsn_key: Option<&str>) -> Result<HealthResponse> {
        let dsn_key = self.resolve_dsn_key(dsn_key)?;
        let body = json!({ "dsnKey": dsn_key });

        self.http
            .post_json(
                RequestOptions::post("/ingest/health", body)
                    .with_auth(self.auth_mode())
                    .ungated(),
            )
            .await
    }

    fn resolve_dsn_key(&self, dsn_key: Option<&str>) -> Result<String> {
        dsn_key
            .or(self.default_dsn_key.as_deref())
            .filter(|k| !k.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Validation("dsn_key is required".to_string()))
    }

    fn auth_mode(&self) -> AuthMode {
        if self.http.has_api_key() {
            AuthMode::ApiKey
        } else {
            AuthMode::None
        }
    }
}
