//! Session registry
//!
//! Maps every live connection to its identity and releases room memberships
//! when a connection goes away.

use std::collections::HashMap;
use std::sync::Arc;

use tandem_shared::Identity;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    connection::Connection,
    error::{ChatError, ChatResult},
    room::RoomManager,
};

pub struct SessionRegistry {
    /// All active connections indexed by session_id
    connections: RwLock<HashMap<Uuid, Arc<Connection>>>,
    rooms: Arc<RoomManager>,
}

impl SessionRegistry {
    pub fn new(rooms: Arc<RoomManager>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            rooms,
        }
    }

    /// Add a connection
    pub async fn register(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut connections = self.connections.write().await;
        connections.insert(conn.session_id, Arc::clone(&conn));

        tracing::info!(
            session_id = %conn.session_id,
            total_connections = connections.len(),
            "WebSocket connection added"
        );

        conn
    }

    /// Bind an identity to a registered connection.
    ///
    /// Re-binding the same identity is a no-op; a different identity is
    /// `Forbidden`.
    pub async fn authenticate(&self, session_id: &Uuid, identity: Identity) -> ChatResult<()> {
        let conn = self.get(session_id).await.ok_or(ChatError::NotFound)?;
        let user_id = identity.id;

        if conn.bind_identity(identity).await? {
            tracing::info!(
                session_id = %session_id,
                user_id = %user_id,
                "WebSocket connection authenticated"
            );
        }
        Ok(())
    }

    /// Remove a connection, close it and release its room memberships.
    /// Idempotent.
    pub async fn unregister(&self, session_id: &Uuid) {
        let removed = {
            let mut connections = self.connections.write().await;
            connections
                .remove(session_id)
                .map(|conn| (conn, connections.len()))
        };

        if let Some((conn, remaining)) = removed {
            self.rooms.remove_connection(session_id).await;
            conn.close().await;

            tracing::info!(
                session_id = %session_id,
                remaining_connections = remaining,
                "WebSocket connection removed"
            );
        }
    }

    /// Get a connection by session ID
    pub async fn get(&self, session_id: &Uuid) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.get(session_id).cloned()
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Get statistics about live sessions
    pub async fn stats(&self) -> SessionStats {
        let snapshot: Vec<Arc<Connection>> = {
            let connections = self.connections.read().await;
            connections.values().cloned().collect()
        };

        let mut authenticated_connections = 0;
        for conn in &snapshot {
            if conn.identity().await.is_some() {
                authenticated_connections += 1;
            }
        }

        SessionStats {
            active_connections: snapshot.len(),
            authenticated_connections,
            active_rooms: self.rooms.room_count().await,
        }
    }

    /// Unregister every connection
    pub async fn close_all(&self) {
        let session_ids: Vec<Uuid> = self.connections.read().await.keys().copied().collect();
        for session_id in &session_ids {
            self.unregister(session_id).await;
        }
        tracing::info!(closed = session_ids.len(), "Closed all WebSocket sessions");
    }
}

/// Statistics about live sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of active connections
    pub active_connections: usize,
    /// Connections with a bound identity
    pub authenticated_connections: usize,
    /// Rooms with at least one local member
    pub active_rooms: usize,
}
