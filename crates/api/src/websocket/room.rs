//! Chat room membership for pub/sub
//!
//! Tracks which local connections have joined which rooms and keeps exactly
//! one backbone subscription per room that has local members.

use std::collections::HashMap;
use std::sync::Arc;

use tandem_shared::{Room, RoomDirectory, RoomId};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::{
    backbone::{Backbone, Delivery, SubscriptionId},
    connection::Connection,
    error::{ChatError, ChatResult},
    events::ServerEvent,
};

struct Member {
    conn: Arc<Connection>,
    /// Backbone watermark at join; earlier deliveries are not for this member
    since: u64,
}

struct RoomEntry {
    members: Vec<Member>,
    subscription: SubscriptionId,
}

/// Manages chat room membership and local fan-out
pub struct RoomManager {
    /// Map of room_id -> live local members and the backbone subscription
    rooms: RwLock<HashMap<RoomId, RoomEntry>>,
    directory: Arc<dyn RoomDirectory>,
    backbone: Arc<dyn Backbone>,
    /// Sink handed to the backbone for every subscribed room
    deliveries: mpsc::UnboundedSender<Delivery>,
}

impl RoomManager {
    pub fn new(
        directory: Arc<dyn RoomDirectory>,
        backbone: Arc<dyn Backbone>,
        deliveries: mpsc::UnboundedSender<Delivery>,
    ) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            directory,
            backbone,
            deliveries,
        }
    }

    /// Add a connection to a room it participates in.
    ///
    /// Joining twice is a no-op. The first local member subscribes this
    /// instance to the room's topic.
    pub async fn join(&self, conn: &Arc<Connection>, room_id: &RoomId) -> ChatResult<Room> {
        let identity = conn.identity().await.ok_or(ChatError::Unauthenticated)?;

        let room = self
            .directory
            .find_room(room_id)
            .await?
            .ok_or(ChatError::NotFound)?;

        if !room.has_participant(identity.id) {
            return Err(ChatError::NotAMember);
        }

        let room_size = {
            let mut rooms = self.rooms.write().await;
            let entry = rooms.entry(room_id.clone()).or_insert_with(|| {
                tracing::debug!(room_id = %room_id, "Subscribing to room topic");
                RoomEntry {
                    members: Vec::new(),
                    subscription: self
                        .backbone
                        .subscribe(room_id.as_str(), self.deliveries.clone()),
                }
            });
            if !entry.members.iter().any(|m| m.conn.session_id == conn.session_id) {
                entry.members.push(Member {
                    conn: Arc::clone(conn),
                    since: self.backbone.watermark(),
                });
            }
            entry.members.len()
        };

        conn.add_room(room_id.clone()).await;

        tracing::debug!(
            room_id = %room_id,
            session_id = %conn.session_id,
            room_size,
            "Connection joined room"
        );

        Ok(room)
    }

    /// Remove a connection from a room. Returns whether it was a member.
    pub async fn leave(&self, room_id: &RoomId, session_id: &Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(entry) = rooms.get_mut(room_id) else {
            return false;
        };

        let before_len = entry.members.len();
        entry.members.retain(|m| m.conn.session_id != *session_id);
        let room_size = entry.members.len();
        let removed = room_size < before_len;

        // Clean up empty rooms
        if room_size == 0 {
            if let Some(entry) = rooms.remove(room_id) {
                self.backbone.unsubscribe(room_id.as_str(), entry.subscription);
            }
            tracing::debug!(room_id = %room_id, "Removed empty room");
        } else if removed {
            tracing::debug!(
                room_id = %room_id,
                session_id = %session_id,
                room_size,
                "Connection left room"
            );
        }

        removed
    }

    /// Remove a connection from all rooms
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        let mut removed_from = 0;

        for entry in rooms.values_mut() {
            let before_len = entry.members.len();
            entry.members.retain(|m| m.conn.session_id != *session_id);
            if entry.members.len() < before_len {
                removed_from += 1;
            }
        }

        // Clean up empty rooms
        let backbone = &self.backbone;
        rooms.retain(|room_id, entry| {
            if entry.members.is_empty() {
                backbone.unsubscribe(room_id.as_str(), entry.subscription);
                false
            } else {
                true
            }
        });

        if removed_from > 0 {
            tracing::debug!(
                session_id = %session_id,
                room_count = removed_from,
                "Removed connection from rooms"
            );
        }
    }

    /// Live local members of a room
    pub async fn members(&self, room_id: &RoomId) -> Vec<Arc<Connection>> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(|entry| entry.members.iter().map(|m| Arc::clone(&m.conn)).collect())
            .unwrap_or_default()
    }

    /// Send an event to every local member of a room
    ///
    /// Silently ignores send errors (closed connections will be cleaned up)
    pub async fn broadcast(&self, room_id: &RoomId, event: ServerEvent) {
        self.deliver(room_id, u64::MAX, event).await;
    }

    /// Send an event carried by backbone delivery `seq` to the members that
    /// had already joined when it was dispatched
    pub async fn deliver(&self, room_id: &RoomId, seq: u64, event: ServerEvent) {
        let rooms = self.rooms.read().await;
        let Some(entry) = rooms.get(room_id) else {
            tracing::debug!(room_id = %room_id, "No local members for room");
            return;
        };

        let mut success_count = 0;
        let mut failed_count = 0;

        for Member { conn, since } in &entry.members {
            if *since > seq {
                continue;
            }
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        session_id = %conn.session_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            room_id = %room_id,
            recipients = success_count,
            failed = failed_count,
            "Broadcast event to room"
        );
    }

    /// Number of local connections in a room
    pub async fn room_size(&self, room_id: &RoomId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(|e| e.members.len()).unwrap_or(0)
    }

    /// Number of rooms with at least one local member
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
