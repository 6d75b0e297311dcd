//! In-process realtime hub
//!
//! Per-topic subscriber registry with presence tracking, for tests, demos
//! and single-process deployments. Presence semantics match the hosted
//! channel service: every track/leave emits a fresh full-state snapshot to
//! all subscribers, and consumers rebuild from it rather than patch.
//!
//! Delivery is best-effort: a subscriber whose buffer is full loses the
//! event (with a warning); a disconnected receiver is pruned on the next
//! delivery attempt.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use shared::realtime::{ChannelEvent, PresenceMeta, PresenceState};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use super::{
    ChannelControl, RealtimeError, RealtimeTransport, SUBSCRIPTION_BUFFER, Subscription,
};

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<ChannelEvent>,
}

#[derive(Default)]
struct Topic {
    subscribers: Vec<Subscriber>,
    presence: HashMap<u64, PresenceMeta>,
}

impl Topic {
    /// Presence snapshot keyed by viewer user id.
    fn presence_state(&self) -> PresenceState {
        let mut state = PresenceState::new();
        for meta in self.presence.values() {
            state
                .entry(meta.user_id.to_string())
                .or_default()
                .push(meta.clone());
        }
        state
    }
}

#[derive(Default)]
struct HubInner {
    topics: DashMap<String, Mutex<Topic>>,
    next_id: AtomicU64,
}

impl HubInner {
    fn deliver(topic_name: &str, topic: &mut Topic, event: &ChannelEvent, skip: Option<u64>) {
        topic.subscribers.retain(|sub| {
            if skip == Some(sub.id) {
                return true;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(topic = %topic_name, subscriber = sub.id, "Subscriber buffer full, event dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    fn track(&self, topic_name: &str, sub_id: u64, meta: PresenceMeta) {
        let Some(entry) = self.topics.get(topic_name) else {
            return;
        };
        let mut topic = entry.lock();
        topic.presence.insert(sub_id, meta);
        let event = ChannelEvent::PresenceJoin(topic.presence_state());
        Self::deliver(topic_name, &mut topic, &event, None);
    }

    fn broadcast(&self, topic_name: &str, sub_id: u64, event: ChannelEvent) {
        let Some(entry) = self.topics.get(topic_name) else {
            return;
        };
        let mut topic = entry.lock();
        Self::deliver(topic_name, &mut topic, &event, Some(sub_id));
    }

    fn leave(&self, topic_name: &str, sub_id: u64) {
        let remove_topic = {
            let Some(entry) = self.topics.get(topic_name) else {
                return;
            };
            let mut topic = entry.lock();
            topic.subscribers.retain(|sub| sub.id != sub_id);
            let had_presence = topic.presence.remove(&sub_id).is_some();
            if had_presence {
                let event = ChannelEvent::PresenceLeave(topic.presence_state());
                Self::deliver(topic_name, &mut topic, &event, None);
            }
            topic.subscribers.is_empty()
        };
        if remove_topic {
            self.topics.remove_if(topic_name, |_, topic| {
                topic.lock().subscribers.is_empty()
            });
        }
    }
}

struct MemoryChannelControl {
    hub: Arc<HubInner>,
    topic: String,
    sub_id: u64,
}

impl ChannelControl for MemoryChannelControl {
    fn track(&self, meta: PresenceMeta) {
        self.hub.track(&self.topic, self.sub_id, meta);
    }

    fn broadcast(&self, event: ChannelEvent) {
        self.hub.broadcast(&self.topic, self.sub_id, event);
    }

    fn leave(&self) {
        self.hub.leave(&self.topic, self.sub_id);
    }
}

/// In-process realtime hub
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server-side push to every subscriber of a topic.
    ///
    /// This is the path the ledger uses to fan out stamp updates; it is
    /// not tied to any subscription.
    pub fn publish(&self, topic_name: &str, event: ChannelEvent) {
        let Some(entry) = self.inner.topics.get(topic_name) else {
            tracing::debug!(topic = %topic_name, "Publish to topic with no subscribers");
            return;
        };
        let mut topic = entry.lock();
        HubInner::deliver(topic_name, &mut topic, &event, None);
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic_name: &str) -> usize {
        self.inner
            .topics
            .get(topic_name)
            .map(|t| t.lock().subscribers.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RealtimeTransport for MemoryHub {
    async fn subscribe(&self, topic_name: &str) -> Result<Subscription, RealtimeError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let sub_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let snapshot = {
            let entry = self
                .inner
                .topics
                .entry(topic_name.to_string())
                .or_default();
            let mut topic = entry.lock();
            topic.subscribers.push(Subscriber { id: sub_id, tx: tx.clone() });
            topic.presence_state()
        };

        // New subscribers always start from a full snapshot
        if tx.try_send(ChannelEvent::PresenceSync(snapshot)).is_err() {
            return Err(RealtimeError::Subscribe(
                "Subscriber buffer rejected initial sync".to_string(),
            ));
        }

        let control = Arc::new(MemoryChannelControl {
            hub: Arc::clone(&self.inner),
            topic: topic_name.to_string(),
            sub_id,
        });

        tracing::debug!(topic = %topic_name, subscriber = sub_id, "Subscribed to realtime channel");
        Ok(Subscription::new(topic_name, rx, control))
    }
}
