//! In-memory storage for tests and single-process development

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChatStore, MessageStore, RequestStore, RoomDirectory, UserDirectory};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    ChatMessage, Identity, InterestRequest, NewMessage, NewUser, RequestStatus, Room, RoomId,
    UserId, UserProfile,
};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, (UserProfile, String)>,
    friendships: BTreeSet<(UserId, UserId)>,
    requests: HashMap<Uuid, InterestRequest>,
    rooms: HashMap<RoomId, Room>,
    rooms_by_pair: HashMap<(UserId, UserId), RoomId>,
    messages: HashMap<RoomId, Vec<ChatMessage>>,
    next_message_id: i64,
}

impl Inner {
    fn identity(&self, id: UserId) -> Option<Identity> {
        self.users.get(&id).map(|(p, _)| p.identity())
    }
}

/// Storage backed by process memory. Everything is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<UserProfile> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|(p, _)| p.username == user.username) {
            return Err(StoreError::Conflict(format!("username {}", user.username)));
        }

        let profile = UserProfile {
            id: UserId::new(),
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.insert(profile.id, (profile.clone(), user.password_hash));
        Ok(profile)
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Identity>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|(p, _)| p.username == username)
            .map(|(p, _)| p.identity()))
    }

    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<Identity>> {
        Ok(self.inner.read().await.identity(id))
    }

    async fn profile(&self, id: UserId) -> StoreResult<Option<UserProfile>> {
        Ok(self.inner.read().await.users.get(&id).map(|(p, _)| p.clone()))
    }

    async fn credentials(&self, username: &str) -> StoreResult<Option<(UserProfile, String)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|(p, _)| p.username == username)
            .cloned())
    }

    async fn list_users_except(&self, id: UserId) -> StoreResult<Vec<UserProfile>> {
        let inner = self.inner.read().await;
        let mut users: Vec<UserProfile> = inner
            .users
            .values()
            .filter(|(p, _)| p.id != id)
            .map(|(p, _)| p.clone())
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn add_friends(&self, a: UserId, b: UserId) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.friendships.insert((a, b));
        inner.friendships.insert((b, a));
        Ok(())
    }

    async fn friends_of(&self, id: UserId) -> StoreResult<Vec<UserProfile>> {
        let inner = self.inner.read().await;
        let mut friends: Vec<UserProfile> = inner
            .friendships
            .iter()
            .filter(|(user, _)| *user == id)
            .filter_map(|(_, friend)| inner.users.get(friend).map(|(p, _)| p.clone()))
            .collect();
        friends.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(friends)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn create_request(&self, from: &Identity, to: &Identity) -> StoreResult<InterestRequest> {
        let mut inner = self.inner.write().await;
        let exists = inner
            .requests
            .values()
            .any(|r| r.request_from.id == from.id && r.request_to.id == to.id);
        if exists {
            return Err(StoreError::Conflict("interest request".to_string()));
        }

        let request = InterestRequest {
            id: Uuid::new_v4(),
            request_from: from.clone(),
            request_to: to.clone(),
            status: RequestStatus::Pending,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_request(&self, id: Uuid) -> StoreResult<Option<InterestRequest>> {
        Ok(self.inner.read().await.requests.get(&id).cloned())
    }

    async fn set_request_status(&self, id: Uuid, status: RequestStatus) -> StoreResult<InterestRequest> {
        let mut inner = self.inner.write().await;
        let request = inner
            .requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("interest request {id}")))?;
        request.status = status;
        Ok(request.clone())
    }

    async fn pending_requests_to(&self, user: UserId) -> StoreResult<Vec<InterestRequest>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<InterestRequest> = inner
            .requests
            .values()
            .filter(|r| r.request_to.id == user && r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        Ok(pending)
    }

    async fn request_exists(&self, from: UserId, to: UserId) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .requests
            .values()
            .any(|r| r.request_from.id == from && r.request_to.id == to))
    }
}

#[async_trait]
impl RoomDirectory for MemoryStore {
    async fn create_room(&self, initiator: &Identity, acceptor: &Identity) -> StoreResult<Room> {
        if initiator.id == acceptor.id {
            return Err(StoreError::Invalid(
                "a room needs two distinct participants".to_string(),
            ));
        }

        let mut inner = self.inner.write().await;
        let key = pair_key(initiator.id, acceptor.id);
        if let Some(existing) = inner.rooms_by_pair.get(&key).and_then(|id| inner.rooms.get(id)) {
            return Ok(existing.clone());
        }

        let room = Room {
            id: RoomId::generate(),
            initiator: initiator.clone(),
            acceptor: acceptor.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        inner.rooms_by_pair.insert(key, room.id.clone());
        inner.rooms.insert(room.id.clone(), room.clone());
        Ok(room)
    }

    async fn find_room(&self, id: &RoomId) -> StoreResult<Option<Room>> {
        Ok(self.inner.read().await.rooms.get(id).cloned())
    }

    async fn rooms_for_user(&self, user: UserId) -> StoreResult<Vec<Room>> {
        let inner = self.inner.read().await;
        let mut rooms: Vec<Room> = inner
            .rooms
            .values()
            .filter(|r| r.has_participant(user))
            .cloned()
            .collect();
        rooms.sort_by_key(|r| r.created_at);
        Ok(rooms)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, message: NewMessage) -> StoreResult<ChatMessage> {
        let mut inner = self.inner.write().await;
        if !inner.rooms.contains_key(&message.room_id) {
            return Err(StoreError::NotFound(format!("room {}", message.room_id)));
        }

        inner.next_message_id += 1;
        let id = inner.next_message_id;
        let history = inner.messages.entry(message.room_id.clone()).or_default();
        let created_at = match history.last() {
            Some(last) if last.created_at > message.created_at => last.created_at,
            _ => message.created_at,
        };

        let stored = ChatMessage {
            id,
            room_id: message.room_id,
            sender: message.sender,
            text: message.text,
            created_at,
        };
        history.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, room_id: &RoomId) -> StoreResult<Vec<ChatMessage>> {
        // Insertion order already matches (created_at, id)
        Ok(self
            .inner
            .read()
            .await
            .messages
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
