//! HTTP client for the Observa ingestion backend
//!
//! Executes single authenticated requests with a timeout and maps results
//! to typed outcomes. Retry behavior wraps every request according to the
//! configured [`RetryPolicy`]. A one-time health probe can be registered;
//! once registered, guarded requests wait for it to finish before going
//! out, so startup traffic serializes behind the probe without callers
//! orchestrating anything.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use super::retry::{run_with_retry, RetryPolicy};
use crate::error::{parse_retry_after, Error, Result};

/// Authentication mode per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Attach the configured API key header; fail with an authentication
    /// error when none is configured.
    ApiKey,
    /// No credential attached.
    None,
}

/// Per-request options.
#[derive(Debug)]
pub struct RequestOptions<'a> {
    pub method: Method,
    pub path: &'a str,
    /// Query parameters; `None` values are omitted.
    pub query: &'a [(&'a str, Option<String>)],
    /// JSON body; when absent no body and no content-type are sent.
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
    pub auth: AuthMode,
    /// Whether this request waits for the registered health probe.
    pub gated: bool,
}

impl<'a> RequestOptions<'a> {
    pub fn post(path: &'a str, body: serde_json::Value) -> Self {
        RequestOptions {
            method: Method::POST,
            path,
            query: &[],
            body: Some(body),
            headers: Vec::new(),
            auth: AuthMode::None,
            gated: true,
        }
    }

    pub fn get(path: &'a str) -> Self {
        RequestOptions {
            method: Method::GET,
            path,
            query: &[],
            body: None,
            headers: Vec::new(),
            auth: AuthMode::None,
            gated: true,
        }
    }

    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn ungated(mut self) -> Self {
        self.gated = false;
        self
    }
}

/// HTTP client for the ingestion backend.
pub struct HttpClient {
    base_url: String,
    api_key: RwLock<Option<String>>,
    default_headers: HashMap<String, String>,
    retry: RetryPolicy,
    http: reqwest::Client,
    health: Mutex<Option<watch::Receiver<bool>>>,
}

impl HttpClient {
    /// Creates a client against `base_url` (trailing slashes stripped).
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout_ms: u64,
        default_headers: HashMap<String, String>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(HttpClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: RwLock::new(api_key),
            default_headers,
            retry,
            http,
            health: Mutex::new(None),
        })
    }

    /// Updates the API key at runtime.
    pub fn set_api_key(&self, api_key: Option<String>) {
        *self.api_key.write().unwrap_or_else(|e| e.into_inner()) = api_key;
    }

    /// Whether an API key is currently configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Registers the one-time health probe. Later calls are ignored.
    ///
    /// The probe runs in the background; every guarded request issued
    /// afterwards waits for it to settle (success or failure) first.
    pub fn start_health_probe<F>(&self, probe: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.health.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        *slot = Some(rx);
        tokio::spawn(async move {
            probe.await;
            let _ = tx.send(true);
        });
    }

    async fn await_health(&self) {
        let receiver = self
            .health
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(mut receiver) = receiver {
            if !*receiver.borrow() {
                // A dropped sender means the probe task died; proceed.
                let _ = receiver.changed().await;
            }
        }
    }

    /// Executes a request with retry, returning the parsed JSON body, or
    /// `None` for an empty 2xx response.
    pub async fn request(&self, options: &RequestOptions<'_>) -> Result<Option<serde_json::Value>> {
        if options.gated {
            self.await_health().await;
        }
        run_with_retry(&self.retry, || self.execute(options)).await
    }

    /// POST helper deserializing the response body.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        options: RequestOptions<'_>,
    ) -> Result<T> {
        let value = self
            .request(&options)
            .await?
            .unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// Executes a single attempt without retry.
    async fn execute(&self, options: &RequestOptions<'_>) -> Result<Option<serde_json::Value>> {
        let url = if options.path.starts_with('/') {
            format!("{}{}", self.base_url, options.path)
        } else {
            format!("{}/{}", self.base_url, options.path)
        };

        let mut builder = self.http.request(options.method.clone(), &url);

        let query: Vec<(&str, &str)> = options
            .query
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (*k, v)))
            .collect();
        if !query.is_empty() {
            builder = builder.query(&query);
        }

        for (key, value) in &self.default_headers {
            builder = builder.header(key, value);
        }
        for (key, value) in &options.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        if options.auth == AuthMode::ApiKey {
            let api_key = self
                .api_key
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
                .ok_or_else(|| Error::Auth("API key is required".to_string()))?;
            builder = builder.header("x-api-key", api_key);
        }

        let response = builder.send().await.map_err(map_transport_error)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        let text = response.text().await.map_err(map_transport_error)?;

        if status.is_success() {
            if text.is_empty() {
                return Ok(None);
            }
            // Non-JSON 2xx bodies are passed through as strings.
            Ok(Some(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))))
        } else {
            Err(Error::from_status(status.as_u16(), text, retry_after))
        }
    }
}

/// Maps a reqwest failure: an aborted deadline is a timeout, anything else
/// is a transport failure.
fn map_transport_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Timeout(error.to_string())
    } else {
        Error::Network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str, api_key: Option<&str>, retry: RetryPolicy) -> HttpClient {
        HttpClient::new(
            base_url,
            api_key.map(str::to_string),
            1000,
            HashMap::new(),
            retry,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_attaches_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ping"))
            .and(header("x-api-key", "key123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server.uri(), Some("key123"), RetryPolicy::none());
        let value = client
            .request(
                &RequestOptions::post("/ping", serde_json::json!({})).with_auth(AuthMode::ApiKey),
            )
            .await
            .unwrap();
        assert_eq!(value.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let client = client("http://127.0.0.1:9", None, RetryPolicy::none());
        let result = client
            .request(
                &RequestOptions::post("/ping", serde_json::json!({})).with_auth(AuthMode::ApiKey),
            )
            .await;
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn test_maps_401_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let client = client(&server.uri(), Some("bad"), RetryPolicy::none());
        let result = client
            .request(
                &RequestOptions::post("/private", serde_json::json!({}))
                    .with_auth(AuthMode::ApiKey),
            )
            .await;
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn test_empty_success_body_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client(&server.uri(), None, RetryPolicy::none());
        let value = client.request(&RequestOptions::get("/empty")).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "2")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let client = client(&server.uri(), None, RetryPolicy::none());
        let result = client.request(&RequestOptions::get("/limited")).await;
        match result {
            Err(Error::RateLimit {
                retry_after_secs, ..
            }) => assert_eq!(retry_after_secs, Some(2)),
            other => panic!("expected rate limit error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_retries_server_errors_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let mut policy = RetryPolicy::new(2);
        // No need to wait out real backoff in tests
        policy.retry_delay = std::sync::Arc::new(|_, _| Duration::from_millis(1));

        let client = client(&server.uri(), None, policy);
        let value = client.request(&RequestOptions::get("/flaky")).await.unwrap();
        assert_eq!(value.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_from_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let slow_client = HttpClient::new(
            &server.uri(),
            None,
            50,
            HashMap::new(),
            RetryPolicy::none(),
        )
        .unwrap();
        let result = slow_client.request(&RequestOptions::get("/slow")).await;
        assert!(matches!(result, Err(Error::Timeout(_))));

        let unreachable = client("http://127.0.0.1:9", None, RetryPolicy::none());
        let result = unreachable.request(&RequestOptions::get("/nowhere")).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_query_params_omit_none_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(wiremock::matchers::query_param("present", "yes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server.uri(), None, RetryPolicy::none());
        let query = [("present", Some("yes".to_string())), ("absent", None)];
        let mut options = RequestOptions::get("/q");
        options.query = &query;
        client.request(&options).await.unwrap();

        let received = &server.received_requests().await.unwrap()[0];
        assert!(!received.url.query().unwrap_or("").contains("absent"));
    }

    #[tokio::test]
    async fn test_requests_wait_for_health_probe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(100))
                    .set_body_json(serde_json::json!({"ok": true})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = std::sync::Arc::new(client(&server.uri(), None, RetryPolicy::none()));
        let probe_client = client.clone();
        client.start_health_probe(async move {
            let _ = probe_client
                .request(&RequestOptions::post("/ingest/health", serde_json::json!({})).ungated())
                .await;
        });

        client.request(&RequestOptions::get("/after")).await.unwrap();

        // The probe must have completed before the gated request went out.
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url.path(), "/ingest/health");
        assert_eq!(requests[1].url.path(), "/after");
    }
}
