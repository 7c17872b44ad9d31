//! Cross-process publish/subscribe fabric
//!
//! Every instance publishes persisted messages to the room's topic and
//! subscribes to the topics of the rooms that have local members. A backbone
//! delivers to subscribers that are live at publish time, in publish order per
//! topic, and never replays a backlog.

mod memory;
mod redis;

pub use self::memory::InMemoryBackbone;
pub use self::redis::RedisBackbone;

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// A payload received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: String,
    /// Position in this backbone's local dispatch order
    pub seq: u64,
}

/// Handle returned by [`Backbone::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, thiserror::Error)]
pub enum BackboneError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Backbone unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Backbone: Send + Sync + 'static {
    /// Publish a payload to every live subscriber of `topic`, on any instance
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BackboneError>;

    /// Register a local sink for `topic`
    fn subscribe(&self, topic: &str, sink: mpsc::UnboundedSender<Delivery>) -> SubscriptionId;

    /// Drop a local sink. Unknown ids are ignored.
    fn unsubscribe(&self, topic: &str, id: SubscriptionId);

    /// Sequence the next local dispatch will carry. Every delivery with a
    /// lower `seq` was dispatched before this call returned.
    fn watermark(&self) -> u64;
}

/// Local sink table shared by the backbone implementations
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    next_seq: AtomicU64,
    sinks: DashMap<String, Vec<(SubscriptionId, mpsc::UnboundedSender<Delivery>)>>,
}

impl Subscribers {
    pub(crate) fn add(&self, topic: &str, sink: mpsc::UnboundedSender<Delivery>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks
            .entry(topic.to_string())
            .or_default()
            .push((id, sink));
        id
    }

    pub(crate) fn remove(&self, topic: &str, id: SubscriptionId) {
        if let Some(mut sinks) = self.sinks.get_mut(topic) {
            sinks.retain(|(sub, _)| *sub != id);
        }
        self.sinks.remove_if(topic, |_, sinks| sinks.is_empty());
    }

    /// Hand a payload to every sink registered for `topic`. Returns the number
    /// of sinks that accepted it.
    pub(crate) fn dispatch(&self, topic: &str, payload: &str) -> usize {
        // Stamp before the sink lookup; a sink added after this point reads a
        // watermark above `seq`
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);

        let Some(sinks) = self.sinks.get(topic) else {
            return 0;
        };

        sinks
            .iter()
            .filter(|(_, sink)| {
                sink.send(Delivery {
                    topic: topic.to_string(),
                    payload: payload.to_string(),
                    seq,
                })
                .is_ok()
            })
            .count()
    }

    pub(crate) fn watermark(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    pub(crate) fn topic_count(&self) -> usize {
        self.sinks.len()
    }
}
