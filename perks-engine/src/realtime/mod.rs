//! Realtime transport
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                RealtimeTransport                      │
//! │   subscribe(topic) -> Subscription                    │
//! └──────────────────────┬───────────────────────────────┘
//!                        │
//!             ┌──────────┴──────────┐
//!             │   pluggable impls   │
//!             └──────────┬──────────┘
//!                        ▼
//!                   MemoryHub (in-process)
//! ```
//!
//! A [`Subscription`] is a scoped resource: acquired once per mounted
//! view, released on teardown. `leave()` is the explicit release; drop
//! performs it as a backstop. There is no automatic reconnection: an
//! embedding shell that wants one re-subscribes explicitly.

mod memory;
mod presence;

pub use memory::MemoryHub;
pub use presence::{PresenceEntry, PresenceSet, PresenceSynchronizer, SyncOutcome};

use async_trait::async_trait;
use shared::realtime::{ChannelEvent, PresenceMeta};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Per-subscription event buffer. Full buffers drop events with a warning
/// rather than block the publisher.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("Subscribe failed: {0}")]
    Subscribe(String),
    #[error("Channel closed")]
    Closed,
}

/// Channel subscription lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Subscribing,
    Subscribed,
}

/// Control surface of one live subscription (transport-specific half).
pub trait ChannelControl: Send + Sync {
    /// Publish/replace this subscriber's presence metadata.
    fn track(&self, meta: PresenceMeta);
    /// Send a broadcast to the channel's other subscribers.
    fn broadcast(&self, event: ChannelEvent);
    /// Release the subscription: untrack presence, stop delivery.
    fn leave(&self);
}

/// One live channel subscription.
pub struct Subscription {
    topic: String,
    events: mpsc::Receiver<ChannelEvent>,
    control: Arc<dyn ChannelControl>,
    left: bool,
}

impl Subscription {
    pub fn new(
        topic: impl Into<String>,
        events: mpsc::Receiver<ChannelEvent>,
        control: Arc<dyn ChannelControl>,
    ) -> Self {
        Self {
            topic: topic.into(),
            events,
            control,
            left: false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Track (or replace) this subscriber's presence metadata.
    pub fn track(&self, meta: PresenceMeta) {
        self.control.track(meta);
    }

    /// Broadcast to the channel's other subscribers.
    pub fn broadcast(&self, event: ChannelEvent) {
        self.control.broadcast(event);
    }

    /// Receive the next event. `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        if self.left {
            return None;
        }
        self.events.recv().await
    }

    /// Drain one already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        if self.left {
            return None;
        }
        self.events.try_recv().ok()
    }

    /// Release the subscription. Idempotent.
    pub fn leave(&mut self) {
        if !self.left {
            self.left = true;
            self.control.leave();
            tracing::debug!(topic = %self.topic, "Left realtime channel");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Teardown must always release the channel, even on unwind paths
        self.leave();
    }
}

/// Transport capable of opening channel subscriptions.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, RealtimeError>;
}
