//! Hook from the request workflow into the chat core

use tandem_shared::{Identity, RoomDirectory, RoomId};

use super::error::{ChatError, ChatResult};

/// Open the chat room for a newly accepted pair.
///
/// Safe to call more than once for the same two users: every call returns the
/// same room.
pub async fn on_request_accepted<R>(
    rooms: &R,
    initiator: &Identity,
    acceptor: &Identity,
) -> ChatResult<RoomId>
where
    R: RoomDirectory + ?Sized,
{
    if initiator.id == acceptor.id {
        return Err(ChatError::InvalidInput(
            "a chat room needs two different users".to_string(),
        ));
    }

    let room = rooms.create_room(initiator, acceptor).await?;

    tracing::info!(
        room_id = %room.id,
        initiator = %room.initiator.id,
        acceptor = %room.acceptor.id,
        "Chat room ready for accepted request"
    );

    Ok(room.id)
}
