//! Asynchronous delivery queue
//!
//! Decouples capture (producer) from delivery (consumer). Events are
//! buffered FIFO; a push schedules a background drain on the next
//! scheduling opportunity unless one is already running. At most one drain
//! runs at a time. A failed delivery is logged and dropped, never
//! re-queued, so one bad event cannot block the rest.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::Transport;
use crate::types::NormalizedEvent;

/// FIFO queue draining through a [`Transport`] sink.
#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    sink: Arc<dyn Transport>,
    buffer: Mutex<VecDeque<NormalizedEvent>>,
    draining: AtomicBool,
}

impl DeliveryQueue {
    pub fn new(sink: Arc<dyn Transport>) -> Self {
        DeliveryQueue {
            inner: Arc::new(QueueInner {
                sink,
                buffer: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Appends an event and schedules a drain if none is running.
    ///
    /// The drain starts on the next scheduling opportunity, not within the
    /// caller's stack frame.
    pub fn push(&self, event: NormalizedEvent) {
        self.inner.lock_buffer().push_back(event);
        if !self.inner.draining.load(Ordering::SeqCst) {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                inner.drain().await;
            });
        }
    }

    /// Drains the buffer through the sink.
    ///
    /// A flush while another drain is already running is a no-op that
    /// returns immediately; it guarantees only that events present at call
    /// time are attempted before returning, and says nothing about whether
    /// any individual delivery succeeded.
    pub async fn flush(&self) {
        self.inner.drain().await;
    }

    /// Number of events waiting for delivery.
    pub fn pending_count(&self) -> usize {
        self.inner.lock_buffer().len()
    }
}

impl QueueInner {
    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, VecDeque<NormalizedEvent>> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn drain(self: &Arc<Self>) {
        while self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            loop {
                // The event leaves the buffer before the attempt; the queue
                // keeps no copy once delivery starts.
                let Some(event) = self.lock_buffer().pop_front() else {
                    break;
                };
                let event_id = event.event_id.clone();
                if let Err(error) = self.sink.send(event).await {
                    tracing::warn!(
                        event_id = %event_id,
                        error = %error,
                        "Failed to deliver event"
                    );
                }
            }

            self.draining.store(false, Ordering::SeqCst);

            // A push that saw the flag still set between the empty check and
            // the reset scheduled nothing; pick its event up now.
            if self.lock_buffer().is_empty() {
                break;
            }
        }
    }
}
