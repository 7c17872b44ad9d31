//! WebSocket handler for Axum
//!
//! Handles WebSocket connections, authentication, and event routing.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tandem_shared::Identity;
use tokio::sync::mpsc;

use crate::state::AppState;

use super::{
    connection::Connection,
    error::{ChatError, ChatResult},
    events::{ClientEvent, ServerEvent},
    state::WebSocketState,
};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
///
/// A valid `?token=` binds the identity before the upgrade. Without a token
/// the client must send `authenticate` first.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, StatusCode> {
    let ws_state = app_state.ws_state.clone();

    let identity = match params.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => match ws_state.current_identity(token).await {
            Ok(identity) => Some(identity),
            Err(ChatError::Unauthenticated) => {
                tracing::warn!("WebSocket auth failed: invalid token");
                return Err(StatusCode::UNAUTHORIZED);
            }
            Err(e) => {
                tracing::error!(error = %e, "WebSocket auth: identity lookup failed");
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        },
        None => None,
    };

    tracing::info!(
        user_id = ?identity.as_ref().map(|i| i.id),
        "WebSocket connection upgrade requested"
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, identity, ws_state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, identity: Option<Identity>, ws_state: WebSocketState) {
    let (sender, receiver) = socket.split();
    serve_connection(sender, receiver, identity, ws_state).await;
}

/// Run one connection over a frame sink and stream until the client leaves,
/// goes idle or the server closes it
pub(crate) async fn serve_connection<S, R>(
    mut sender: S,
    mut receiver: R,
    identity: Option<Identity>,
    ws_state: WebSocketState,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let username = identity.as_ref().map(|i| i.username.clone());
    let conn = match identity {
        Some(identity) => Connection::authenticated(identity, tx),
        None => Connection::new(tx),
    };
    let conn = ws_state.sessions.register(conn).await;
    let session_id = conn.session_id;

    // Send connection acknowledgment
    let _ = conn.send(ServerEvent::Connected { session_id });
    if let Some(username) = username {
        let _ = conn.send(ServerEvent::Authenticated { username });
    }

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    let idle_timeout = ws_state.settings.idle_timeout;
    loop {
        let frame = tokio::select! {
            _ = conn.closed() => {
                tracing::info!(session_id = %session_id, "WebSocket connection closed by server");
                break;
            }
            frame = next_frame(&mut receiver, idle_timeout) => frame,
        };

        let Some(frame) = frame else {
            break;
        };

        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(event, &conn, &ws_state).await,
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "Failed to parse client event"
                    );
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            Ok(_) => {} // Ping/pong handled by axum; binary frames ignored
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Cleanup on disconnect
    tracing::info!(session_id = %session_id, "WebSocket connection closing");
    ws_state.sessions.unregister(&session_id).await;
    send_task.abort();
}

/// Next inbound frame, or `None` when the stream ended or stayed idle too long
async fn next_frame<R>(
    receiver: &mut R,
    idle_timeout: Option<Duration>,
) -> Option<Result<Message, axum::Error>>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, receiver.next()).await {
            Ok(frame) => frame,
            Err(_) => {
                tracing::info!(idle_secs = limit.as_secs(), "Closing idle WebSocket connection");
                None
            }
        },
        None => receiver.next().await,
    }
}

/// Apply one client event to a registered connection.
///
/// Failures are logged and never reported back to the client.
pub async fn handle_client_event(event: ClientEvent, conn: &Arc<Connection>, ws_state: &WebSocketState) {
    if let Err(e) = dispatch(event, conn, ws_state).await {
        match e {
            ChatError::Store(_) | ChatError::Backbone(_) | ChatError::Internal(_) => {
                tracing::error!(session_id = %conn.session_id, error = %e, "Client event failed");
            }
            _ => {
                tracing::warn!(session_id = %conn.session_id, error = %e, "Client event rejected");
            }
        }
    }
}

async fn dispatch(event: ClientEvent, conn: &Arc<Connection>, ws_state: &WebSocketState) -> ChatResult<()> {
    use ClientEvent::*;

    let needs_identity = !matches!(event, Authenticate { .. } | Ping);
    if needs_identity && conn.identity().await.is_none() {
        return Err(ChatError::Unauthenticated);
    }

    match event {
        Authenticate { token } => {
            let identity = ws_state.current_identity(&token).await?;
            let username = identity.username.clone();
            ws_state.sessions.authenticate(&conn.session_id, identity).await?;
            let _ = conn.send(ServerEvent::Authenticated { username });
        }

        JoinRoom { room_id } => {
            ws_state.rooms.join(conn, &room_id).await?;
            let _ = conn.send(ServerEvent::room_joined(room_id));
        }

        LeaveRoom { room_id } => {
            ws_state.rooms.leave(&room_id, &conn.session_id).await;
            conn.remove_room(&room_id).await;
        }

        // The claimed sender is ignored; the session identity is authoritative
        SendMessage { room_id, text, .. } => {
            ws_state.pipeline.send(conn, &room_id, &text).await?;
        }

        Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }

    Ok(())
}
