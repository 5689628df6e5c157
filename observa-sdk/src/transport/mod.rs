//! Event delivery: pluggable sink and FIFO queue

pub mod queue;

pub use queue::DeliveryQueue;

use async_trait::async_trait;

use crate::error::Result;
use crate::ingest::{IngestApi, IngestRequest};
use crate::types::NormalizedEvent;

/// Delivery sink consumed by the [`DeliveryQueue`].
///
/// Any mechanism that can deliver a normalized event satisfies this
/// contract; the SDK ships [`HttpTransport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, event: NormalizedEvent) -> Result<()>;
}

/// Delivers events through the ingestion HTTP API.
pub struct HttpTransport {
    api: IngestApi,
    sdk_version: String,
}

impl HttpTransport {
    pub fn new(api: IngestApi) -> Self {
        HttpTransport {
            api,
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, event: NormalizedEvent) -> Result<()> {
        let mut request = IngestRequest::new(event);
        request.sdk_version = Some(self.sdk_version.clone());
        self.api.event(request).await?;
        Ok(())
    }
}
