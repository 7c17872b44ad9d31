//! Single-process backbone

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Backbone, BackboneError, Delivery, SubscriptionId, Subscribers};

/// Backbone that delivers within the current process.
///
/// Sinks are called synchronously from `publish`, so several gateway
/// instances sharing one `InMemoryBackbone` see the same per-topic order.
#[derive(Debug, Default)]
pub struct InMemoryBackbone {
    subscribers: Subscribers,
}

impl InMemoryBackbone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of topics with at least one live sink
    pub fn topic_count(&self) -> usize {
        self.subscribers.topic_count()
    }
}

#[async_trait]
impl Backbone for InMemoryBackbone {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BackboneError> {
        let delivered = self.subscribers.dispatch(topic, &payload);
        tracing::trace!(topic = %topic, delivered, "Published to in-memory backbone");
        Ok(())
    }

    fn subscribe(&self, topic: &str, sink: mpsc::UnboundedSender<Delivery>) -> SubscriptionId {
        self.subscribers.add(topic, sink)
    }

    fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        self.subscribers.remove(topic, id);
    }

    fn watermark(&self) -> u64 {
        self.subscribers.watermark()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_live_subscribers_in_order() {
        let backbone = InMemoryBackbone::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        backbone.subscribe("room-a", tx1);
        backbone.subscribe("room-a", tx2);

        for n in 0..3 {
            backbone.publish("room-a", format!("m{n}")).await.unwrap();
        }

        for rx in [&mut rx1, &mut rx2] {
            for n in 0..3 {
                let delivery = rx.try_recv().unwrap();
                assert_eq!(delivery.topic, "room-a");
                assert_eq!(delivery.payload, format!("m{n}"));
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_no_backlog_and_no_delivery_after_unsubscribe() {
        let backbone = InMemoryBackbone::new();
        backbone.publish("room-a", "early".to_string()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = backbone.subscribe("room-a", tx);
        assert!(rx.try_recv().is_err());

        backbone.publish("room-b", "elsewhere".to_string()).await.unwrap();
        assert!(rx.try_recv().is_err());

        backbone.unsubscribe("room-a", id);
        assert_eq!(backbone.topic_count(), 0);

        backbone.publish("room-a", "late".to_string()).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_keeps_other_sinks() {
        let backbone = InMemoryBackbone::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let first = backbone.subscribe("room-a", tx1);
        backbone.subscribe("room-a", tx2);
        backbone.unsubscribe("room-a", first);

        backbone.publish("room-a", "hi".to_string()).await.unwrap();
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap().payload, "hi");
    }

    #[tokio::test]
    async fn test_watermark_orders_dispatches() {
        let backbone = InMemoryBackbone::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        backbone.subscribe("room-a", tx);

        backbone.publish("room-a", "first".to_string()).await.unwrap();
        let mark = backbone.watermark();
        backbone.publish("room-b", "unheard".to_string()).await.unwrap();
        backbone.publish("room-a", "second".to_string()).await.unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(first.seq < mark);
        assert!(second.seq > mark);
    }
}
