//! Real-time chat over WebSocket
//!
//! # Architecture
//!
//! - **Connection**: a live WebSocket connection and its lifecycle state
//! - **Session**: registry of live connections and their identities
//! - **Room**: which local connections have joined which chat rooms
//! - **Pipeline**: validate, persist, then publish a message
//! - **Backbone**: cross-process pub/sub that carries published messages to
//!   every instance with members in the room
//! - **State**: the above wired together, plus the fan-out task
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: type-safe event definitions for client/server communication

pub mod accept;
pub mod backbone;
pub mod connection;
pub mod error;
pub mod events;
pub mod handler;
pub mod pipeline;
pub mod room;
pub mod session;
pub mod state;

pub use accept::on_request_accepted;
pub use backbone::{Backbone, BackboneError, InMemoryBackbone, RedisBackbone};
pub use connection::{Connection, ConnectionState};
pub use error::{ChatError, ChatResult};
pub use events::{ClientEvent, MessageView, ServerEvent};
pub use handler::{handle_client_event, ws_handler};
pub use state::{Collaborators, GatewaySettings, WebSocketState};
