//! Sync-completion events and their delivery channel.
//!
//! Each subscriber gets its own bounded queue; the engine publishes with
//! `try_send` and moves on, so a slow consumer can never stall the next
//! cycle. Delivery is at-least-once for consumers that keep up; a lagging
//! subscriber loses events (logged) rather than applying backpressure, and
//! consumers must be idempotent on `version_id` in any case.

use crate::types::VersionId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Emitted after a cycle persists and propagates a new unified version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCompleted {
    pub version_id: VersionId,
    pub version_number: u64,
    pub change_count: usize,
    pub conflict_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Fan-out channel for sync events.
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<SyncCompleted>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a subscriber with its own bounded queue.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<SyncCompleted> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Deliver an event to every live subscriber without blocking.
    /// Closed subscribers are pruned; full queues drop the event with a warn.
    pub fn publish(&self, event: &SyncCompleted) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    version_id = %event.version_id,
                    "Subscriber queue full; dropping sync event"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
