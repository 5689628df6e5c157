//! SDK facade
//!
//! [`ObservaClient`] owns the whole capture pipeline: it reads the ambient
//! scope, builds and normalizes events, and queues them for background
//! delivery. It is an explicitly constructed service object; hosts create
//! one, share it (it is cheap to wrap in `Arc`), and call
//! [`ObservaClient::close`] on shutdown.
//!
//! Capture operations never fail the caller: any error past this boundary
//! is logged and converted into a `None` event id, because telemetry must
//! never break the host application.

use std::sync::Arc;

use crate::config::Options;
use crate::context::ProcessContextProvider;
use crate::error::Result;
use crate::http::{HttpClient, RetryPolicy};
use crate::ids::UuidGenerator;
use crate::ingest::IngestApi;
use crate::normalize::Normalizer;
use crate::scope::{self, BaseContext};
use crate::stacktrace::{BacktraceParser, StackParser};
use crate::transport::{DeliveryQueue, HttpTransport, Transport};
use crate::types::{Contexts, Event, Exception, Level, NormalizedEvent, SdkInfo, TraceContext};

/// Event filter/mutator applied after normalization; returning `None`
/// drops the event.
pub type BeforeSend = Arc<dyn Fn(NormalizedEvent) -> Option<NormalizedEvent> + Send + Sync>;

/// Main SDK client for error and message capture.
pub struct ObservaClient {
    options: Options,
    http: Arc<HttpClient>,
    queue: DeliveryQueue,
    normalizer: Normalizer,
    stack_parser: Arc<dyn StackParser>,
    before_send: Option<BeforeSend>,
}

impl ObservaClient {
    /// Creates a client from validated options.
    ///
    /// Must be called inside a tokio runtime: the delivery queue and the
    /// optional health probe spawn background tasks. Environment, release,
    /// and service from the options are merged into the process-wide base
    /// scope so every later capture inherits them.
    pub fn new(options: Options) -> Result<Self> {
        options.validate()?;

        let http = Arc::new(HttpClient::new(
            &options.normalized_base_url(),
            options.api_key.clone(),
            options.timeout_ms,
            options.headers.clone(),
            RetryPolicy::new(options.retry.max_retries),
        )?);
        let ingest = IngestApi::new(http.clone(), options.dsn_key.clone());

        if options.health_check {
            let probe_api = ingest.clone();
            http.start_health_probe(async move {
                if let Err(error) = probe_api.health(None).await {
                    tracing::debug!(error = %error, "Ingestion health probe failed");
                }
            });
        }

        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(ingest));
        let queue = DeliveryQueue::new(transport);

        let normalizer = Normalizer::new(
            &options,
            Arc::new(UuidGenerator),
            Arc::new(ProcessContextProvider::new()),
        );

        scope::set_base_context(BaseContext {
            environment: options.environment.clone(),
            release: options.release.clone(),
            service: options.service.clone(),
        });

        Ok(ObservaClient {
            options,
            http,
            queue,
            normalizer,
            stack_parser: Arc::new(BacktraceParser),
            before_send: None,
        })
    }

    /// Replaces the delivery sink; events queue through `sink` instead of
    /// the HTTP transport.
    pub fn with_transport(mut self, sink: Arc<dyn Transport>) -> Self {
        self.queue = DeliveryQueue::new(sink);
        self
    }

    /// Installs an event filter/mutator applied after normalization.
    pub fn with_before_send(mut self, before_send: BeforeSend) -> Self {
        self.before_send = Some(before_send);
        self
    }

    /// Replaces the stack trace parser.
    pub fn with_stack_parser(mut self, parser: Arc<dyn StackParser>) -> Self {
        self.stack_parser = parser;
        self
    }

    /// Rotates the API key used for delivery at runtime.
    pub fn set_api_key(&self, api_key: Option<String>) {
        self.http.set_api_key(api_key);
    }

    /// Captures an error with the stack trace of the capture site.
    ///
    /// Returns the queued event id, or `None` when disabled, sampled out,
    /// dropped by `before_send`, or rejected during normalization. Never
    /// panics or surfaces an error.
    pub fn capture_error<E>(&self, error: &E) -> Option<String>
    where
        E: std::error::Error + ?Sized,
    {
        if !self.options.enabled {
            return None;
        }
        let backtrace = std::backtrace::Backtrace::force_capture().to_string();
        let exception = Exception {
            exception_type: Some(short_type_name::<E>()),
            value: Some(error.to_string()),
            stacktrace: self.stack_parser.parse(&backtrace),
        };
        let event = self.build_event(Level::Error, None, Some(exception));
        self.capture(event)
    }

    /// Captures a plain message at the given level.
    pub fn capture_message(&self, message: &str, level: Level) -> Option<String> {
        if !self.options.enabled {
            return None;
        }
        let event = self.build_event(level, Some(message.to_string()), None);
        self.capture(event)
    }

    /// Captures a caller-built raw event.
    pub fn capture_event(&self, event: Event) -> Option<String> {
        if !self.options.enabled {
            return None;
        }
        self.capture(event)
    }

    /// Attempts delivery of everything queued so far.
    ///
    /// Best-effort: returns once the buffer has been attempted (or
    /// immediately when another drain is already running); per-event
    /// outcomes are not reported.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    /// Flushes and releases the client.
    pub async fn close(self) {
        self.flush().await;
    }

    /// Number of events still waiting for delivery.
    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }

    /// The outermost swallow boundary: errors become a logged `None`.
    fn capture(&self, event: Event) -> Option<String> {
        match self.try_capture(event) {
            Ok(event_id) => event_id,
            Err(error) => {
                tracing::warn!(error = %error, "Failed to capture event");
                None
            }
        }
    }

    fn try_capture(&self, event: Event) -> Result<Option<String>> {
        if !self.is_sampled() {
            return Ok(None);
        }
        let normalized = self.normalizer.normalize(event)?;
        let normalized = match &self.before_send {
            Some(before_send) => match before_send(normalized) {
                Some(event) => event,
                None => return Ok(None),
            },
            None => normalized,
        };
        let event_id = normalized.event_id.clone();
        self.queue.push(normalized);
        Ok(Some(event_id))
    }

    fn is_sampled(&self) -> bool {
        let rate = self.options.sample_rate;
        if rate >= 1.0 {
            return true;
        }
        rand::random::<f64>() < rate
    }

    /// Builds a raw event by merging the current scope with the capture
    /// inputs.
    fn build_event(
        &self,
        level: Level,
        message: Option<String>,
        exception: Option<Exception>,
    ) -> Event {
        let scope = scope::current_scope();

        let contexts = scope.propagation.trace_id.as_ref().map(|trace_id| Contexts {
            trace: Some(TraceContext {
                trace_id: trace_id.clone(),
                span_id: scope.propagation.span_id.clone(),
                sampled: scope.propagation.sampled,
            }),
            ..Default::default()
        });

        Event {
            event_id: None,
            timestamp: None,
            level: Some(level),
            message,
            exception,
            environment: scope.base_context.environment,
            release: scope.base_context.release,
            service: scope.base_context.service,
            user: scope.user,
            tags: scope.tags,
            extra: scope.extra,
            breadcrumbs: scope.breadcrumbs,
            contexts,
            sdk: Some(SdkInfo::default()),
            schema_version: None,
        }
    }
}

/// Final path segment of a type name, e.g. `io::Error` → `Error`.
fn short_type_name<E: ?Sized>() -> String {
    let full = std::any::type_name::<E>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::scope::{run_isolated, set_tag, ScopeSeed};
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSink {
        events: Mutex<Vec<NormalizedEvent>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(RecordingSink {
                events: Mutex::new(Vec::new()),
            })
        }

        fn events(&self) -> Vec<NormalizedEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingSink {
        async fn send(&self, event: NormalizedEvent) -> crate::error::Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn test_client(options: Options) -> (ObservaClient, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        let client = ObservaClient::new(options)
            .unwrap()
            .with_transport(sink.clone());
        (client, sink)
    }

    fn test_options() -> Options {
        Options {
            api_key: Some("key_test".to_string()),
            dsn_key: Some("dsn_test".to_string()),
            health_check: false,
            include_context: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_capture_message_delivers_payload() {
        let (client, sink) = test_client(test_options());

        let event_id = client.capture_message("hello", Level::Info).unwrap();
        client.flush().await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, event_id);
        assert_eq!(events[0].level, Some(Level::Info));
        assert_eq!(events[0].message.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_capture_error_builds_exception() {
        let (client, sink) = test_client(test_options());

        let error = Error::Validation("broken".to_string());
        client.capture_error(&error).unwrap();
        client.flush().await;

        let events = sink.events();
        let exception = events[0].exception.as_ref().unwrap();
        assert_eq!(exception.exception_type.as_deref(), Some("Error"));
        assert_eq!(
            exception.value.as_deref(),
            Some("validation error: broken")
        );
        assert!(events[0].message.is_none());
    }

    #[tokio::test]
    async fn test_capture_includes_scope_state() {
        let (client, sink) = test_client(test_options());

        run_isolated(ScopeSeed::default(), async {
            set_tag("request.id", "r-17");
            client.capture_message("tagged", Level::Warning);
        })
        .await;
        client.flush().await;

        let events = sink.events();
        assert_eq!(
            events[0].tags.get("request.id").map(String::as_str),
            Some("r-17")
        );
    }

    #[tokio::test]
    async fn test_disabled_client_captures_nothing() {
        let (client, sink) = test_client(Options {
            enabled: false,
            ..test_options()
        });

        assert!(client.capture_message("nope", Level::Info).is_none());
        client.flush().await;
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_sampled_out_capture_returns_none() {
        let (client, sink) = test_client(Options {
            sample_rate: 0.0,
            ..test_options()
        });

        assert!(client.capture_message("unlucky", Level::Info).is_none());
        client.flush().await;
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_event_swallowed_not_propagated() {
        let (client, sink) = test_client(test_options());

        // Neither message nor exception: normalization rejects it, the
        // caller only sees None.
        assert!(client.capture_event(Event::default()).is_none());
        client.flush().await;
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_before_send_can_drop_and_mutate() {
        let (client, sink) = test_client(test_options());
        let client = client.with_before_send(Arc::new(|mut event: NormalizedEvent| {
            if event.message.as_deref() == Some("secret") {
                return None;
            }
            event.message = Some("scrubbed".to_string());
            Some(event)
        }));

        assert!(client.capture_message("secret", Level::Info).is_none());
        client.capture_message("public", Level::Info).unwrap();
        client.flush().await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message.as_deref(), Some("scrubbed"));
    }

    #[tokio::test]
    async fn test_environment_from_options_reaches_events() {
        let (client, sink) = test_client(Options {
            environment: Some("prod-test-client".to_string()),
            ..test_options()
        });

        client.capture_message("env", Level::Info);
        client.flush().await;

        assert_eq!(
            sink.events()[0].environment.as_deref(),
            Some("prod-test-client")
        );
    }

    #[test]
    fn test_new_rejects_missing_credentials() {
        let options = Options {
            api_key: None,
            dsn_key: None,
            ..Default::default()
        };
        assert!(ObservaClient::new(options).is_err());
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<std::io::Error>(), "Error");
    }
}
