//! Error types for observa-sdk

use thiserror::Error;

/// Main error type for the observa-sdk library
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed caller input; never retried
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or rejected credential; never retried
    #[error("authentication error: {0}")]
    Auth(String),

    /// HTTP 400
    #[error("bad request ({status}): {body}")]
    BadRequest { status: u16, body: String },

    /// HTTP 403
    #[error("forbidden ({status}): {body}")]
    Forbidden { status: u16, body: String },

    /// HTTP 404
    #[error("not found ({status}): {body}")]
    NotFound { status: u16, body: String },

    /// HTTP 409
    #[error("conflict ({status}): {body}")]
    Conflict { status: u16, body: String },

    /// HTTP 429, carrying the server-provided retry-after when present
    #[error("rate limited ({status}): {body}")]
    RateLimit {
        status: u16,
        body: String,
        retry_after_secs: Option<u64>,
    },

    /// Any 5xx
    #[error("server error ({status}): {body}")]
    Server {
        status: u16,
        body: String,
        retry_after_secs: Option<u64>,
    },

    /// Any other non-2xx status
    #[error("unexpected status ({status}): {body}")]
    Client { status: u16, body: String },

    /// Transport-level failure (DNS, connect, TLS, broken pipe)
    #[error("network error: {0}")]
    Network(String),

    /// Request deadline exceeded
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for observa-sdk
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Map a non-2xx HTTP status to a typed error.
    ///
    /// `retry_after_secs` is attached to rate-limit and server errors only.
    pub fn from_status(status: u16, body: String, retry_after_secs: Option<u64>) -> Self {
        match status {
            400 => Error::BadRequest { status, body },
            401 => Error::Auth(body),
            403 => Error::Forbidden { status, body },
            404 => Error::NotFound { status, body },
            409 => Error::Conflict { status, body },
            429 => Error::RateLimit {
                status,
                body,
                retry_after_secs,
            },
            s if s >= 500 => Error::Server {
                status,
                body,
                retry_after_secs,
            },
            _ => Error::Client { status, body },
        }
    }

    /// Default retry predicate: rate limits, server errors, and
    /// transport-level failures are transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimit { .. } | Error::Server { .. } | Error::Network(_) | Error::Timeout(_)
        )
    }

    /// Retry-after hint carried by the error, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Error::RateLimit {
                retry_after_secs, ..
            }
            | Error::Server {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Parse a `retry-after` header value into seconds from now.
///
/// Accepts either an integer seconds value or an HTTP date. Dates in the
/// past yield zero. Unparseable values yield `None`.
pub(crate) fn parse_retry_after(value: &str, now: chrono::DateTime<chrono::Utc>) -> Option<u64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return Some(secs.max(0) as u64);
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - now;
    Some(delta.num_seconds().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            Error::from_status(400, "bad".into(), None),
            Error::BadRequest { status: 400, .. }
        ));
        assert!(matches!(
            Error::from_status(401, "no".into(), None),
            Error::Auth(_)
        ));
        assert!(matches!(
            Error::from_status(404, "missing".into(), None),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            Error::from_status(429, "slow down".into(), Some(2)),
            Error::RateLimit {
                retry_after_secs: Some(2),
                ..
            }
        ));
        assert!(matches!(
            Error::from_status(503, "busy".into(), Some(1)),
            Error::Server {
                status: 503,
                retry_after_secs: Some(1),
                ..
            }
        ));
        assert!(matches!(
            Error::from_status(418, "teapot".into(), None),
            Error::Client { status: 418, .. }
        ));
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::from_status(500, String::new(), None).is_retryable());
        assert!(Error::from_status(429, String::new(), None).is_retryable());
        assert!(Error::Network("reset".into()).is_retryable());
        assert!(Error::Timeout("5s".into()).is_retryable());
        assert!(!Error::from_status(400, String::new(), None).is_retryable());
        assert!(!Error::from_status(401, String::new(), None).is_retryable());
        assert!(!Error::Validation("bad input".into()).is_retryable());
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let now = Utc::now();
        assert_eq!(parse_retry_after("2", now), Some(2));
        assert_eq!(parse_retry_after("0", now), Some(0));
        assert_eq!(parse_retry_after("-5", now), Some(0));
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let now = Utc::now();
        let future = (now + Duration::seconds(90)).to_rfc2822();
        let parsed = parse_retry_after(&future, now).unwrap();
        assert!((89..=91).contains(&parsed));

        let past = (now - Duration::seconds(90)).to_rfc2822();
        assert_eq!(parse_retry_after(&past, now), Some(0));
    }

    #[test]
    fn test_parse_retry_after_garbage() {
        assert_eq!(parse_retry_after("soon", Utc::now()), None);
    }
}
