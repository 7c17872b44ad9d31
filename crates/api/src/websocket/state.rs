//! Global WebSocket state management
//!
//! Wires the session registry, room manager and message pipeline to their
//! collaborators, and runs the fan-out task that turns backbone deliveries into
//! `message_received` events for local members.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tandem_shared::{ChatMessage, Identity, MessageStore, RoomDirectory, RoomId, UserDirectory, UserId};
use tokio::{sync::mpsc, task::AbortHandle};

use crate::{auth::JwtManager, config::Config};

use super::{
    backbone::{Backbone, Delivery},
    error::{ChatError, ChatResult},
    events::ServerEvent,
    pipeline::MessagePipeline,
    room::RoomManager,
    session::{SessionRegistry, SessionStats},
};

/// Storage collaborators consumed by the chat core
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserDirectory>,
    pub rooms: Arc<dyn RoomDirectory>,
    pub messages: Arc<dyn MessageStore>,
}

impl Collaborators {
    /// Use one store for every collaborator
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserDirectory + RoomDirectory + MessageStore + 'static,
    {
        Self {
            users: store.clone(),
            rooms: store.clone(),
            messages: store,
        }
    }
}

/// Gateway tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Close a connection that sends nothing for this long
    pub idle_timeout: Option<Duration>,
    /// Longest accepted message, in characters
    pub max_message_length: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(300)),
            max_message_length: 4000,
        }
    }
}

impl From<&Config> for GatewaySettings {
    fn from(config: &Config) -> Self {
        Self {
            idle_timeout: config.ws_idle_timeout(),
            max_message_length: config.max_message_length,
        }
    }
}

/// Real-time state shared across all connections of one instance
#[derive(Clone)]
pub struct WebSocketState {
    /// Live connections
    pub sessions: Arc<SessionRegistry>,

    /// Room membership for local connections
    pub rooms: Arc<RoomManager>,

    pub pipeline: Arc<MessagePipeline>,

    pub settings: GatewaySettings,

    users: Arc<dyn UserDirectory>,
    jwt: JwtManager,
    fanout: Arc<AbortHandle>,
}

impl WebSocketState {
    /// Build the state and start its fan-out task. Must be called inside a
    /// tokio runtime.
    pub fn new(
        collaborators: Collaborators,
        backbone: Arc<dyn Backbone>,
        jwt: JwtManager,
        settings: GatewaySettings,
    ) -> Self {
        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();

        let rooms = Arc::new(RoomManager::new(
            Arc::clone(&collaborators.rooms),
            Arc::clone(&backbone),
            deliveries_tx,
        ));
        let sessions = Arc::new(SessionRegistry::new(Arc::clone(&rooms)));
        let pipeline = Arc::new(MessagePipeline::new(
            collaborators.rooms,
            collaborators.messages,
            backbone,
            settings.max_message_length,
        ));

        let fanout = tokio::spawn(run_fanout(deliveries_rx, Arc::downgrade(&rooms)));

        Self {
            sessions,
            rooms,
            pipeline,
            settings,
            users: collaborators.users,
            jwt,
            fanout: Arc::new(fanout.abort_handle()),
        }
    }

    /// Identity behind an access token
    pub async fn current_identity(&self, token: &str) -> ChatResult<Identity> {
        let claims = self.jwt.validate_access_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected WebSocket token");
            ChatError::Unauthenticated
        })?;

        self.users
            .find_by_id(UserId(claims.sub))
            .await?
            .ok_or(ChatError::Unauthenticated)
    }

    /// Identity registered under a username
    pub async fn resolve_identity(&self, username: &str) -> ChatResult<Identity> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or(ChatError::NotFound)
    }

    /// Get statistics about the WebSocket state
    pub async fn stats(&self) -> SessionStats {
        self.sessions.stats().await
    }

    /// Close every session and stop fan-out
    pub async fn shutdown(&self) {
        self.sessions.close_all().await;
        self.fanout.abort();
        tracing::info!("WebSocket gateway stopped");
    }
}

/// Deliver backbone payloads to local room members, one at a time
async fn run_fanout(mut deliveries: mpsc::UnboundedReceiver<Delivery>, rooms: Weak<RoomManager>) {
    while let Some(delivery) = deliveries.recv().await {
        let Some(rooms) = rooms.upgrade() else {
            break;
        };

        match serde_json::from_str::<ChatMessage>(&delivery.payload) {
            Ok(message) => {
                let room_id = RoomId::from(delivery.topic);
                rooms
                    .deliver(&room_id, delivery.seq, ServerEvent::message_received(&message))
                    .await;
            }
            Err(e) => {
                tracing::warn!(
                    topic = %delivery.topic,
                    error = %e,
                    "Dropping malformed backbone payload"
                );
            }
        }
    }

    tracing::debug!("Fan-out task finished");
}
