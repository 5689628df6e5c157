//! SDK configuration
//!
//! Options are normally built in code and passed to
//! [`crate::client::ObservaClient::new`], but they can also be loaded from a
//! TOML file for hosts that keep SDK settings alongside their own config.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Fixed backend target when no `base_url` is configured.
pub const DEFAULT_BASE_URL: &str = "https://ingest.observa.dev/v1";

/// SDK configuration options.
#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    /// Organization API key used to authenticate SDK requests.
    pub api_key: Option<String>,

    /// Project DSN identifying the destination of events.
    pub dsn_key: Option<String>,

    /// Ingestion backend base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment name stamped on every event (e.g. "production").
    pub environment: Option<String>,

    /// Release identifier stamped on every event.
    pub release: Option<String>,

    /// Service name stamped on every event.
    pub service: Option<String>,

    /// Kill switch: when false, capture calls return immediately.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Fraction of events to keep, in `0.0..=1.0`.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry behavior for transient delivery failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Whether to run the one-time ingestion health probe at startup.
    #[serde(default = "default_health_check")]
    pub health_check: bool,

    /// Whether to enrich events with process/runtime context blocks.
    #[serde(default = "default_include_context")]
    pub include_context: bool,

    /// Additional headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Event size and truncation limits.
    #[serde(default)]
    pub limits: EventLimits,

    /// Schema version assigned to events that carry none.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            api_key: None,
            dsn_key: None,
            base_url: default_base_url(),
            environment: None,
            release: None,
            service: None,
            enabled: default_enabled(),
            sample_rate: default_sample_rate(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
            health_check: default_health_check(),
            include_context: default_include_context(),
            headers: HashMap::new(),
            limits: EventLimits::default(),
            schema_version: default_schema_version(),
        }
    }
}

/// Retry knobs for transient delivery failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Number of additional attempts after the first. Zero means a single
    /// attempt with no retry.
    #[serde(default)]
    pub max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig { max_retries: 0 }
    }
}

/// Size and truncation limits applied during normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct EventLimits {
    /// Maximum message length in characters; the prefix is kept.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Maximum exception value length in characters.
    #[serde(default = "default_max_exception_value_length")]
    pub max_exception_value_length: usize,

    /// Maximum number of stack frames kept, in order.
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,

    /// Ceiling on the serialized event size in bytes.
    #[serde(default = "default_max_event_bytes")]
    pub max_event_bytes: usize,
}

impl Default for EventLimits {
    fn default() -> Self {
        EventLimits {
            max_message_length: default_max_message_length(),
            max_exception_value_length: default_max_exception_value_length(),
            max_frames: default_max_frames(),
            max_event_bytes: default_max_event_bytes(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_sample_rate() -> f64 {
    1.0
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_health_check() -> bool {
    true
}

fn default_include_context() -> bool {
    true
}

fn default_schema_version() -> u32 {
    1
}

fn default_max_message_length() -> usize {
    4000
}

fn default_max_exception_value_length() -> usize {
    4000
}

fn default_max_frames() -> usize {
    60
}

fn default_max_event_bytes() -> usize {
    65536
}

impl Options {
    /// Load options from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {:?}: {}", path, e))
        })?;

        let options: Options = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(options)
    }

    /// Validate options, returning an error message if invalid.
    ///
    /// At least one of `api_key` / `dsn_key` must be present: the backend
    /// accepts either a static key header or a per-project key in the body.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_none() && self.dsn_key.is_none() {
            return Err(Error::Config(
                "at least one of api_key or dsn_key is required".to_string(),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("base_url must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(Error::Config(
                "sample_rate must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.limits.max_event_bytes == 0 {
            return Err(Error::Config(
                "limits.max_event_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The base URL with trailing slashes stripped and the `/v1` API
    /// prefix ensured.
    pub fn normalized_base_url(&self) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        if trimmed.ends_with("/v1") {
            trimmed.to_string()
        } else {
            format!("{}/v1", trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert!(options.enabled);
        assert_eq!(options.timeout_ms, 5000);
        assert_eq!(options.sample_rate, 1.0);
        assert_eq!(options.retry.max_retries, 0);
        assert_eq!(options.limits.max_message_length, 4000);
        assert_eq!(options.limits.max_frames, 60);
        assert_eq!(options.limits.max_event_bytes, 65536);
        assert_eq!(options.schema_version, 1);
    }

    #[test]
    fn test_validate_requires_credential() {
        let options = Options::default();
        assert!(options.validate().is_err());

        let options = Options {
            dsn_key: Some("dsn_live_abc".to_string()),
            ..Default::default()
        };
        assert!(options.validate().is_ok());

        let options = Options {
            api_key: Some("key_123".to_string()),
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_sample_rate_bounds() {
        let options = Options {
            api_key: Some("key".to_string()),
            sample_rate: 1.5,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_parse_options() {
        let toml = r#"
api_key = "key_123"
dsn_key = "dsn_live_abc"
environment = "staging"
timeout_ms = 2500

[retry]
max_retries = 2

[limits]
max_event_bytes = 32768
"#;
        let options: Options = toml::from_str(toml).unwrap();
        assert_eq!(options.api_key.as_deref(), Some("key_123"));
        assert_eq!(options.environment.as_deref(), Some("staging"));
        assert_eq!(options.timeout_ms, 2500);
        assert_eq!(options.retry.max_retries, 2);
        assert_eq!(options.limits.max_event_bytes, 32768);
        // Unset fields fall back to defaults
        assert_eq!(options.limits.max_frames, 60);
        assert!(options.enabled);
    }

    #[test]
    fn test_normalized_base_url() {
        let mut options = Options {
            base_url: "https://ingest.example.com///".to_string(),
            ..Default::default()
        };
        assert_eq!(options.normalized_base_url(), "https://ingest.example.com/v1");

        options.base_url = "https://ingest.example.com/v1".to_string();
        assert_eq!(options.normalized_base_url(), "https://ingest.example.com/v1");
    }
}
