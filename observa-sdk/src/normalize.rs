//! Event normalization
//!
//! Converts a raw [`Event`] into a [`NormalizedEvent`]: validates the
//! timestamp and exception shape, truncates oversized fields, enriches with
//! process context, assigns the event id and schema version, and enforces
//! the serialized-size ceiling through staged field removal.
//!
//! Every failure is a synchronous [`Error::Validation`]; nothing here is
//! retried.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{EventLimits, Options};
use crate::context::ContextProvider;
use crate::error::{Error, Result};
use crate::ids::IdGenerator;
use crate::types::{Contexts, Event, Exception, NormalizedEvent, Stacktrace};

/// Path fragments marking frames that belong to dependencies rather than
/// application code.
const DEPENDENCY_DIR_MARKERS: &[&str] = &["node_modules/", ".cargo/registry", "/vendor/"];

/// Deterministic event → normalized-event transform.
pub struct Normalizer {
    limits: EventLimits,
    include_context: bool,
    default_schema_version: u32,
    ids: Arc<dyn IdGenerator>,
    context: Arc<dyn ContextProvider>,
}

impl Normalizer {
    pub fn new(
        options: &Options,
        ids: Arc<dyn IdGenerator>,
        context: Arc<dyn ContextProvider>,
    ) -> Self {
        Normalizer {
            limits: options.limits.clone(),
            include_context: options.include_context,
            default_schema_version: options.schema_version,
            ids,
            context,
        }
    }

    /// Normalizes a raw event.
    ///
    /// The output always carries an event id, an RFC 3339 timestamp, a
    /// schema version, and serializes to at most the configured byte
    /// ceiling.
    pub fn normalize(&self, event: Event) -> Result<NormalizedEvent> {
        let timestamp = resolve_timestamp(event.timestamp.as_deref())?;

        let mut message = event.message;
        if let Some(message) = message.as_mut() {
            truncate_chars(message, self.limits.max_message_length);
        }

        let exception = match event.exception {
            Some(exception) => Some(self.normalize_exception(exception)?),
            None => None,
        };

        if message.is_none() && exception.is_none() {
            return Err(Error::Validation(
                "message or exception required".to_string(),
            ));
        }

        let contexts = if self.include_context {
            Some(self.merge_contexts(event.contexts))
        } else {
            event.contexts
        };

        let event_id = event
            .event_id
            .unwrap_or_else(|| self.ids.generate());
        let schema_version = event
            .schema_version
            .unwrap_or(self.default_schema_version);

        let mut normalized = NormalizedEvent {
            event_id,
            timestamp,
            level: event.level,
            message,
            exception,
            environment: event.environment,
            release: event.release,
            service: event.service,
            user: event.user,
            tags: event.tags,
            extra: event.extra,
            breadcrumbs: event.breadcrumbs,
            contexts,
            sdk: event.sdk,
            schema_version,
        };
        normalized.prune_contexts();

        self.enforce_size(&mut normalized)?;
        Ok(normalized)
    }

    fn normalize_exception(&self, exception: Exception) -> Result<Exception> {
        let exception_type = exception
            .exception_type
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Validation("exception requires a type".to_string()))?;
        let mut value = exception
            .value
            .ok_or_else(|| Error::Validation("exception requires a value".to_string()))?;
        truncate_chars(&mut value, self.limits.max_exception_value_length);

        let stacktrace = exception.stacktrace.map(|st| self.normalize_stacktrace(st));

        Ok(Exception {
            exception_type: Some(exception_type),
            value: Some(value),
            stacktrace,
        })
    }

    fn normalize_stacktrace(&self, mut stacktrace: Stacktrace) -> Stacktrace {
        stacktrace.frames.truncate(self.limits.max_frames);
        for frame in &mut stacktrace.frames {
            let from_dependency = frame
                .filename
                .as_deref()
                .is_some_and(|f| DEPENDENCY_DIR_MARKERS.iter().any(|m| f.contains(m)));
            frame.in_app = Some(match frame.in_app {
                Some(explicit) => explicit,
                None => !from_dependency,
            });
        }
        stacktrace
    }

    /// Fills `contexts.system` and `contexts.runtime` from the provider,
    /// never overwriting values already present on the input.
    fn merge_contexts(&self, contexts: Option<Contexts>) -> Contexts {
        let mut contexts = contexts.unwrap_or_default();
        if contexts.system.is_none() {
            contexts.system = Some(self.context.dynamic_context());
        }
        if contexts.runtime.is_none() {
            contexts.runtime = Some(self.context.static_context());
        }
        contexts
    }

    /// Applies the staged degradation order until the serialized event fits
    /// the byte ceiling: drop extra, drop tags, drop the stacktrace, then
    /// re-truncate message and exception value.
    fn enforce_size(&self, event: &mut NormalizedEvent) -> Result<()> {
        let budget = self.limits.max_event_bytes;
        if serialized_len(event)? <= budget {
            return Ok(());
        }

        event.extra.clear();
        if serialized_len(event)? <= budget {
            return Ok(());
        }

        event.tags.clear();
        if serialized_len(event)? <= budget {
            return Ok(());
        }

        if let Some(exception) = event.exception.as_mut() {
            exception.stacktrace = None;
        }
        if serialized_len(event)? <= budget {
            return Ok(());
        }

        if let Some(message) = event.message.as_mut() {
            truncate_chars(message, self.limits.max_message_length);
        }
        if let Some(value) = event.exception.as_mut().and_then(|e| e.value.as_mut()) {
            truncate_chars(value, self.limits.max_exception_value_length);
        }
        let len = serialized_len(event)?;
        if len <= budget {
            return Ok(());
        }

        Err(Error::Validation(format!(
            "event exceeds size limit after degradation ({} > {} bytes)",
            len, budget
        )))
    }
}

fn resolve_timestamp(timestamp: Option<&str>) -> Result<DateTime<Utc>> {
    match timestamp {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| Error::Validation(format!("unparseable timestamp {:?}: {}", raw, e))),
    }
}

fn serialized_len(event: &NormalizedEvent) -> Result<usize> {
    Ok(serde_json::to_vec(event)?.len())
}

/// Truncates to at most `max` characters, keeping the prefix.
fn truncate_chars(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}
