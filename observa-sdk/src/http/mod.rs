//! HTTP delivery layer: single-request client and retry policy

pub mod client;
pub mod retry;

pub use client::{AuthMode, HttpClient, RequestOptions};
pub use retry::{default_backoff, run_with_retry, RetryPolicy};
