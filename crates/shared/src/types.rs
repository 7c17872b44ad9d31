//! Common types used across Tandem

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// User ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Chat room identifier.
///
/// Short, opaque and safe to share in URLs. It doubles as the broadcast topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Generate a fresh room identifier (32 lowercase hex characters)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Identity & Users
// =============================================================================

/// An authenticated user account, independent of any connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
}

impl Identity {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// Public user profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl UserProfile {
    pub fn identity(&self) -> Identity {
        Identity::new(self.id, self.username.clone())
    }
}

/// Data needed to create a user account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

// =============================================================================
// Rooms & Messages
// =============================================================================

/// A two-party chat room created when an interest request is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub initiator: Identity,
    pub acceptor: Identity,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Room {
    /// Whether the user is one of the two participants
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.initiator.id == user_id || self.acceptor.id == user_id
    }
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub room_id: RoomId,
    pub sender: Identity,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A message that has not been written yet
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender: Identity,
    pub text: String,
    /// Requested timestamp; stores never go below the room's latest message
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Interest Requests
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accept,
    Reject,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accept => "accept",
            RequestStatus::Reject => "reject",
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accept" => Ok(RequestStatus::Accept),
            "reject" => Ok(RequestStatus::Reject),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

/// An interest request from one user to another
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestRequest {
    pub id: Uuid,
    pub request_from: Identity,
    pub request_to: Identity,
    pub status: RequestStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity::new(UserId::new(), name)
    }

    #[test]
    fn test_room_participants() {
        let alice = identity("alice");
        let bob = identity("bob");
        let room = Room {
            id: RoomId::generate(),
            initiator: alice.clone(),
            acceptor: bob.clone(),
            created_at: OffsetDateTime::now_utc(),
        };

        assert!(room.has_participant(alice.id));
        assert!(room.has_participant(bob.id));
        assert!(!room.has_participant(UserId::new()));
    }

    #[test]
    fn test_room_id_is_short_hex() {
        let id = RoomId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(serde_json::to_string(&RoomId::from("abc123")).unwrap(), r#""abc123""#);
    }

    #[test]
    fn test_request_status_parsing() {
        assert_eq!("accept".parse::<RequestStatus>(), Ok(RequestStatus::Accept));
        assert!("maybe".parse::<RequestStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&RequestStatus::Reject).unwrap(),
            r#""reject""#
        );
    }
}
