//! Message pipeline: validate, persist, publish
//!
//! A message is published to the backbone only after it has been stored.
//! Within a process, sends to the same room are serialized by a per-room lock
//! so the published order matches the stored order.

use std::sync::Arc;

use dashmap::DashMap;
use tandem_shared::{ChatMessage, MessageStore, NewMessage, RoomDirectory, RoomId};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::{
    backbone::Backbone,
    connection::Connection,
    error::{ChatError, ChatResult},
};

pub struct MessagePipeline {
    rooms: Arc<dyn RoomDirectory>,
    messages: Arc<dyn MessageStore>,
    backbone: Arc<dyn Backbone>,
    max_message_length: usize,
    /// Present only while some send for the room holds or awaits the lock
    room_locks: Arc<DashMap<RoomId, Arc<Mutex<()>>>>,
}

impl MessagePipeline {
    pub fn new(
        rooms: Arc<dyn RoomDirectory>,
        messages: Arc<dyn MessageStore>,
        backbone: Arc<dyn Backbone>,
        max_message_length: usize,
    ) -> Self {
        Self {
            rooms,
            messages,
            backbone,
            max_message_length,
            room_locks: Arc::new(DashMap::new()),
        }
    }

    /// Store a message from `conn` and publish it to the room's topic.
    ///
    /// The store-and-publish step runs on its own task, so it completes even
    /// if the caller is cancelled mid-send.
    pub async fn send(&self, conn: &Connection, room_id: &RoomId, text: &str) -> ChatResult<ChatMessage> {
        let sender = conn.identity().await.ok_or(ChatError::Unauthenticated)?;

        if text.trim().is_empty() {
            return Err(ChatError::InvalidInput("message text is empty".to_string()));
        }
        if text.chars().count() > self.max_message_length {
            return Err(ChatError::InvalidInput(format!(
                "message text exceeds {} characters",
                self.max_message_length
            )));
        }

        let room = self
            .rooms
            .find_room(room_id)
            .await?
            .ok_or(ChatError::NotFound)?;
        if !room.has_participant(sender.id) {
            tracing::warn!(
                room_id = %room_id,
                user_id = %sender.id,
                "Rejected message from non-participant"
            );
            return Err(ChatError::Forbidden);
        }

        let lock = Arc::clone(self.room_locks.entry(room_id.clone()).or_default().value());
        let room_locks = Arc::clone(&self.room_locks);
        let messages = Arc::clone(&self.messages);
        let backbone = Arc::clone(&self.backbone);
        let new_message = NewMessage {
            room_id: room.id,
            sender,
            text: text.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };

        let task = tokio::spawn(async move {
            let lock_key = new_message.room_id.clone();
            let outcome = persist_and_publish(lock, messages.as_ref(), backbone.as_ref(), new_message).await;
            room_locks.remove_if(&lock_key, |_, lock| Arc::strong_count(lock) == 1);
            outcome
        });

        task.await
            .map_err(|e| ChatError::Internal(format!("send task failed: {e}")))?
    }
}

/// Store then publish while holding the room lock. The lock is released on
/// return.
async fn persist_and_publish(
    lock: Arc<Mutex<()>>,
    messages: &dyn MessageStore,
    backbone: &dyn Backbone,
    new_message: NewMessage,
) -> ChatResult<ChatMessage> {
    let _guard = lock.lock_owned().await;

    let message = messages.create_message(new_message).await?;
    let payload = serde_json::to_string(&message).map_err(|e| ChatError::Backbone(e.into()))?;

    if let Err(e) = backbone.publish(message.room_id.as_str(), payload).await {
        tracing::error!(
            room_id = %message.room_id,
            message_id = message.id,
            error = %e,
            "Message stored but not published"
        );
        return Err(ChatError::Backbone(e));
    }

    tracing::debug!(
        room_id = %message.room_id,
        message_id = message.id,
        "Message stored and published"
    );
    Ok(message)
}
