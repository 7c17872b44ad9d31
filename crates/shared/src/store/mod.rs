//! Persistence collaborators
//!
//! The chat core never talks to a database directly. It consumes these traits,
//! which are implemented by [`PgStore`] in production and by [`MemoryStore`]
//! for tests and single-process development.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{
    ChatMessage, Identity, InterestRequest, NewMessage, NewUser, RequestStatus, Room, RoomId,
    UserId, UserProfile,
};

/// User accounts, credentials and the friend relation
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Create an account. Fails with `Conflict` when the username is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<UserProfile>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Identity>>;

    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<Identity>>;

    async fn profile(&self, id: UserId) -> StoreResult<Option<UserProfile>>;

    /// Profile plus stored password hash, for credential verification
    async fn credentials(&self, username: &str) -> StoreResult<Option<(UserProfile, String)>>;

    async fn list_users_except(&self, id: UserId) -> StoreResult<Vec<UserProfile>>;

    /// Make two users friends of each other. Idempotent.
    async fn add_friends(&self, a: UserId, b: UserId) -> StoreResult<()>;

    async fn friends_of(&self, id: UserId) -> StoreResult<Vec<UserProfile>>;
}

/// Interest requests between users
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Create a pending request. Fails with `Conflict` if one already exists
    /// for the same direction.
    async fn create_request(&self, from: &Identity, to: &Identity) -> StoreResult<InterestRequest>;

    async fn find_request(&self, id: Uuid) -> StoreResult<Option<InterestRequest>>;

    async fn set_request_status(&self, id: Uuid, status: RequestStatus) -> StoreResult<InterestRequest>;

    async fn pending_requests_to(&self, user: UserId) -> StoreResult<Vec<InterestRequest>>;

    async fn request_exists(&self, from: UserId, to: UserId) -> StoreResult<bool>;
}

/// Chat rooms
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Create the room for a participant pair.
    ///
    /// Idempotent on the unordered pair: a second call for the same two users
    /// returns the existing room.
    async fn create_room(&self, initiator: &Identity, acceptor: &Identity) -> StoreResult<Room>;

    async fn find_room(&self, id: &RoomId) -> StoreResult<Option<Room>>;

    async fn rooms_for_user(&self, user: UserId) -> StoreResult<Vec<Room>>;
}

/// Append-only chat history
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message. The stored `created_at` is never older than the
    /// latest message already in the room.
    async fn create_message(&self, message: NewMessage) -> StoreResult<ChatMessage>;

    /// All messages of a room ordered by `(created_at, id)`
    async fn list_messages(&self, room_id: &RoomId) -> StoreResult<Vec<ChatMessage>>;
}

/// Everything the HTTP API needs from storage
#[async_trait]
pub trait ChatStore: UserDirectory + RequestStore + RoomDirectory + MessageStore {
    /// Cheap connectivity probe for health checks
    async fn ping(&self) -> StoreResult<()>;
}
