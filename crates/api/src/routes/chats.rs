//! Chat room and history routes

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;
use tandem_shared::{Room, RoomId};
use time::OffsetDateTime;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    websocket::MessageView,
};

#[derive(Debug, Serialize)]
pub struct ChatSummary {
    pub short_id: RoomId,
    pub initiator: String,
    pub acceptor: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Room> for ChatSummary {
    fn from(room: Room) -> Self {
        Self {
            short_id: room.id,
            initiator: room.initiator.username,
            acceptor: room.acceptor.username,
            created_at: room.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatsResponse {
    pub payload: Vec<ChatSummary>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub room_id: RoomId,
    pub payload: Vec<MessageView>,
}

/// Rooms the caller participates in
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<ChatsResponse>> {
    let rooms = state.store.rooms_for_user(auth_user.user_id).await?;
    Ok(Json(ChatsResponse {
        payload: rooms.into_iter().map(ChatSummary::from).collect(),
    }))
}

/// Ordered history of one room
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<MessagesResponse>> {
    let room_id = RoomId::from(room_id);
    let room = state
        .store
        .find_room(&room_id)
        .await?
        .filter(|room| room.has_participant(auth_user.user_id))
        .ok_or(ApiError::NotFound)?;

    let messages = state.store.list_messages(&room.id).await?;

    Ok(Json(MessagesResponse {
        payload: messages.iter().map(MessageView::from).collect(),
        room_id: room.id,
    }))
}
