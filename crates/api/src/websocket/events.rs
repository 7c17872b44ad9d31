//! WebSocket event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization.

use serde::{Deserialize, Serialize};
use tandem_shared::{ChatMessage, RoomId};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Bind an identity to a connection opened without a token
    Authenticate { token: String },

    /// Start receiving messages for a chat room
    JoinRoom {
        #[serde(alias = "chat_id")]
        room_id: RoomId,
    },

    /// Stop receiving messages for a chat room
    LeaveRoom {
        #[serde(alias = "chat_id")]
        room_id: RoomId,
    },

    /// Post a message to a chat room
    SendMessage {
        #[serde(alias = "chat_id")]
        room_id: RoomId,
        #[serde(alias = "message")]
        text: String,
        /// Accepted for older clients and ignored; the sender is always the
        /// session's identity
        #[serde(default)]
        sender: Option<String>,
    },

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection established
    Connected { session_id: Uuid },

    /// Identity bound to the connection
    Authenticated { username: String },

    /// Join acknowledgement, sent only to the joining connection
    RoomJoined { room_id: RoomId, msg: String },

    /// A message posted to a joined room
    MessageReceived { message: MessageView },

    /// Heartbeat response
    Pong,
}

impl ServerEvent {
    pub fn room_joined(room_id: RoomId) -> Self {
        ServerEvent::RoomJoined {
            room_id,
            msg: "Entered the room".to_string(),
        }
    }

    pub fn message_received(message: &ChatMessage) -> Self {
        ServerEvent::MessageReceived {
            message: MessageView::from(message),
        }
    }
}

/// Wire form of a chat message. The room is implied by the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub sender: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id,
            sender: message.sender.username.clone(),
            text: message.text.clone(),
            created_at: message.created_at,
        }
    }
}
