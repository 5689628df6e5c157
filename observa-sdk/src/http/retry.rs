//! Retry policy and executor for transient delivery failures

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// Computes the delay before a retry, from the 1-indexed retry attempt
/// number and the error that triggered it.
pub type DelayFn = Arc<dyn Fn(usize, &Error) -> Duration + Send + Sync>;

/// Decides whether an error should be retried.
pub type PredicateFn = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Retry policy for transient errors. Pure configuration, no state.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Number of additional attempts after the first; zero means exactly
    /// one attempt.
    pub max_retries: usize,
    pub retry_delay: DelayFn,
    pub should_retry: PredicateFn,
}

impl RetryPolicy {
    /// Policy with the default backoff and predicate.
    pub fn new(max_retries: usize) -> Self {
        RetryPolicy {
            max_retries,
            retry_delay: Arc::new(default_backoff),
            should_retry: Arc::new(Error::is_retryable),
        }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        RetryPolicy::new(0)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(0)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Default backoff: a server-provided retry-after wins, otherwise
/// exponential from 1s doubling per attempt, capped at 8s.
pub fn default_backoff(attempt: usize, error: &Error) -> Duration {
    if let Some(secs) = error.retry_after_secs() {
        return Duration::from_secs(secs);
    }
    let exponent = attempt.saturating_sub(1) as u32;
    let millis = 1000u64.checked_shl(exponent).unwrap_or(u64::MAX).min(8000);
    Duration::from_millis(millis)
}

/// Runs `op`, retrying failures that match the policy's predicate until
/// `max_retries` additional attempts are exhausted.
///
/// The total number of attempts is `max_retries + 1`; the final failure
/// propagates unchanged.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_retries || !(policy.should_retry)(&error) {
                    return Err(error);
                }
                attempt += 1;
                let delay = (policy.retry_delay)(attempt, &error);
                tracing::debug!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
