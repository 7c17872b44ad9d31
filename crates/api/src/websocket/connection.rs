//! WebSocket connection management
//!
//! Represents a live WebSocket connection, its lifecycle state and the rooms it
//! has joined.

use std::collections::HashSet;

use tandem_shared::{Identity, RoomId};
use tokio::sync::{mpsc, Notify, RwLock};
use uuid::Uuid;

use super::{error::ChatError, events::ServerEvent};

/// Lifecycle of a connection: `Connected` -> `Ready` -> `Closed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport is open, no identity bound yet
    Connected,
    /// Identity bound; the connection may join rooms and send messages
    Ready(Identity),
    /// Terminal
    Closed,
}

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    state: RwLock<ConnectionState>,

    /// Rooms this connection has joined since it connected
    rooms: RwLock<HashSet<RoomId>>,

    close_signal: Notify,
}

impl Connection {
    /// Create a new unauthenticated connection
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            sender,
            state: RwLock::new(ConnectionState::Connected),
            rooms: RwLock::new(HashSet::new()),
            close_signal: Notify::new(),
        }
    }

    /// Create a connection that is already bound to an identity
    pub fn authenticated(identity: Identity, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        let conn = Self::new(sender);
        Self {
            state: RwLock::new(ConnectionState::Ready(identity)),
            ..conn
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// The bound identity, if the connection is `Ready`
    pub async fn identity(&self) -> Option<Identity> {
        match &*self.state.read().await {
            ConnectionState::Ready(identity) => Some(identity.clone()),
            _ => None,
        }
    }

    /// Bind an identity.
    ///
    /// Returns `true` when the connection moved to `Ready`, `false` when the
    /// same identity was already bound.
    pub async fn bind_identity(&self, identity: Identity) -> Result<bool, ChatError> {
        let mut state = self.state.write().await;
        match &*state {
            ConnectionState::Connected => {
                *state = ConnectionState::Ready(identity);
                Ok(true)
            }
            ConnectionState::Ready(current) if current.id == identity.id => Ok(false),
            ConnectionState::Ready(_) => Err(ChatError::Forbidden),
            ConnectionState::Closed => Err(ChatError::Unauthenticated),
        }
    }

    /// Move to `Closed` and wake the receive loop
    pub async fn close(&self) {
        *self.state.write().await = ConnectionState::Closed;
        self.rooms.write().await.clear();
        self.close_signal.notify_one();
    }

    /// Resolves once [`Connection::close`] has been called
    pub async fn closed(&self) {
        self.close_signal.notified().await;
    }

    /// Record a joined room
    pub async fn add_room(&self, room_id: RoomId) {
        self.rooms.write().await.insert(room_id);
    }

    /// Forget a joined room
    pub async fn remove_room(&self, room_id: &RoomId) {
        self.rooms.write().await.remove(room_id);
    }

    pub async fn is_in_room(&self, room_id: &RoomId) -> bool {
        self.rooms.read().await.contains(room_id)
    }

    /// Get all joined rooms
    pub async fn rooms(&self) -> HashSet<RoomId> {
        self.rooms.read().await.clone()
    }
}
