//! # observa-sdk
//!
//! Client SDK for capturing errors and messages and shipping them to an
//! Observa ingestion backend.
//!
//! This library provides:
//! - A capture facade ([`ObservaClient`]) that never fails the caller
//! - Request-isolated scope state (user, tags, breadcrumbs, trace ids)
//! - Event normalization with size bounds and graceful degradation
//! - Background FIFO delivery with retries and a startup health gate
//!
//! ## Example
//!
//! ```rust,no_run
//! use observa_sdk::{ObservaClient, Options, Level};
//!
//! # async fn run() {
//! let client = ObservaClient::new(Options {
//!     api_key: Some("key_...".to_string()),
//!     dsn_key: Some("dsn_...".to_string()),
//!     environment: Some("production".to_string()),
//!     ..Default::default()
//! })
//! .expect("invalid options");
//!
//! client.capture_message("service started", Level::Info);
//! client.close().await;
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use client::{BeforeSend, ObservaClient};
pub use config::{EventLimits, Options, RetryConfig};
pub use error::{Error, Result};
pub use scope::{
    add_breadcrumb, pop_scope, push_scope, run_isolated, set_extra, set_propagation_context,
    set_tag, set_user, with_scope, PropagationContext, Scope, ScopeSeed,
};
pub use types::{
    Breadcrumb, Contexts, Event, Exception, Frame, Level, NormalizedEvent, SdkInfo, Stacktrace,
    TraceContext, User,
};

// Public modules
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod ids;
pub mod ingest;
pub mod logging;
pub mod normalize;
pub mod scope;
pub mod stacktrace;
pub mod trace;
pub mod transport;
pub mod types;
