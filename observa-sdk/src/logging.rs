//! Logging helpers for observa-sdk
//!
//! The SDK emits diagnostics through `tracing` and expects the host
//! application to install its own subscriber. These helpers cover the two
//! cases where no subscriber exists: debugging an integration and tests.

use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber for debugging SDK behavior.
///
/// Respects `RUST_LOG`; defaults to `observa_sdk=debug`. Does nothing if a
/// global subscriber is already set.
pub fn init_debug() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("observa_sdk=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

/// Initialize logging for tests (logs to the test writer)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
