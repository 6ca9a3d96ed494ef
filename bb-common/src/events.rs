//! Event types and the in-process event bus
//!
//! The bus is a `tokio::sync::broadcast` channel. Publishing never blocks and
//! never fails the caller: with no subscribers the event is simply dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Catalog events pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BreadboardEvent {
    /// A new image record was created by reconciliation
    NewImage {
        /// Lab name the image belongs to (the channel group)
        lab: String,
        image_id: i64,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl BreadboardEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            BreadboardEvent::NewImage { .. } => "new-image",
        }
    }

    /// Lab the event is tagged with
    pub fn lab(&self) -> &str {
        match self {
            BreadboardEvent::NewImage { lab, .. } => lab,
        }
    }
}

/// Broadcast bus for [`BreadboardEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BreadboardEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per slow subscriber before
    /// the oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BreadboardEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: BreadboardEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
