//! Redis pub/sub backbone
//!
//! Publishes go through a shared `ConnectionManager`. Each process holds one
//! pattern subscription on `<prefix>*` and routes incoming messages to the
//! local sinks registered for the topic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};

use super::{Backbone, BackboneError, Delivery, SubscriptionId, Subscribers};

const RECONNECT_BASE_DELAY_MS: u64 = 10;
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(10);

pub struct RedisBackbone {
    publisher: ConnectionManager,
    prefix: String,
    subscribers: Arc<Subscribers>,
    listener: JoinHandle<()>,
}

impl RedisBackbone {
    /// Connect the publisher and start the subscription listener
    pub async fn connect(redis_url: &str, prefix: impl Into<String>) -> Result<Self, BackboneError> {
        let prefix = prefix.into();
        let client = Client::open(redis_url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        let subscribers = Arc::new(Subscribers::default());

        let listener = tokio::spawn(run_listener(
            client,
            prefix.clone(),
            Arc::clone(&subscribers),
        ));

        tracing::info!(prefix = %prefix, "Connected to Redis broadcast backbone");

        Ok(Self {
            publisher,
            prefix,
            subscribers,
            listener,
        })
    }

    fn channel(&self, topic: &str) -> String {
        format!("{}{}", self.prefix, topic)
    }
}

impl Drop for RedisBackbone {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl Backbone for RedisBackbone {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BackboneError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(self.channel(topic), payload).await?;
        tracing::trace!(topic = %topic, receivers, "Published to Redis backbone");
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

/// Keep a pattern subscription alive and feed local sinks
async fn run_listener(client: Client, prefix: String, subscribers: Arc<Subscribers>) {
    let pattern = format!("{prefix}*");

    loop {
        let retry_strategy = ExponentialBackoff::from_millis(RECONNECT_BASE_DELAY_MS)
            .max_delay(RECONNECT_MAX_DELAY)
            .map(jitter);

        let subscribed = Retry::start(retry_strategy, || {
            let client = client.clone();
            let pattern = pattern.clone();
            async move {
                let mut pubsub = client.get_async_pubsub().await.map_err(|e| {
                    tracing::warn!(error = %e, "Backbone subscriber connection failed - will retry");
                    e
                })?;
                pubsub.psubscribe(&pattern).await?;
                Ok::<_, redis::RedisError>(pubsub)
            }
        })
        .await;

        let pubsub = match subscribed {
            Ok(pubsub) => pubsub,
            Err(e) => {
                tracing::error!(error = %e, "Backbone subscription failed");
                continue;
            }
        };

        tracing::info!(pattern = %pattern, "Subscribed to broadcast backbone");

        let mut messages = pubsub.into_on_message();
        while let Some(msg) = messages.next().await {
            let channel = msg.get_channel_name();
            let Some(topic) = channel.strip_prefix(prefix.as_str()) else {
                continue;
            };

            match msg.get_payload::<String>() {
                Ok(payload) => {
                    subscribers.dispatch(topic, &payload);
                }
                Err(e) => {
                    tracing::warn!(error = %e, topic = %topic, "Dropping undecodable backbone payload");
                }
            }
        }

        tracing::warn!("Backbone subscription stream ended, reconnecting");
    }
}
