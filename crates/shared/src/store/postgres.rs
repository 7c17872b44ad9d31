//! PostgreSQL storage

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{ChatStore, MessageStore, RequestStore, RoomDirectory, UserDirectory};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    ChatMessage, Identity, InterestRequest, NewMessage, NewUser, RequestStatus, Room, RoomId,
    UserId, UserProfile,
};

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    created_at: OffsetDateTime,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        UserProfile {
            id: UserId(row.id),
            username: row.username,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

#[derive(Debug, FromRow)]
struct RoomRow {
    id: String,
    initiator_id: Uuid,
    initiator_username: String,
    acceptor_id: Uuid,
    acceptor_username: String,
    created_at: OffsetDateTime,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Room {
            id: RoomId(row.id),
            initiator: Identity::new(UserId(row.initiator_id), row.initiator_username),
            acceptor: Identity::new(UserId(row.acceptor_id), row.acceptor_username),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: i64,
    room_id: String,
    sender_id: Uuid,
    sender_username: String,
    text: String,
    created_at: OffsetDateTime,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        ChatMessage {
            id: row.id,
            room_id: RoomId(row.room_id),
            sender: Identity::new(UserId(row.sender_id), row.sender_username),
            text: row.text,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct RequestRow {
    id: Uuid,
    from_id: Uuid,
    from_username: String,
    to_id: Uuid,
    to_username: String,
    status: String,
    created_at: OffsetDateTime,
}

impl TryFrom<RequestRow> for InterestRequest {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(InterestRequest {
            id: row.id,
            request_from: Identity::new(UserId(row.from_id), row.from_username),
            request_to: Identity::new(UserId(row.to_id), row.to_username),
            status: row.status.parse().map_err(StoreError::Invalid)?,
            created_at: row.created_at,
        })
    }
}

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, created_at";

const ROOM_SELECT: &str = r#"
    SELECT r.id, r.initiator_id, i.username AS initiator_username,
           r.acceptor_id, a.username AS acceptor_username, r.created_at
    FROM chat_rooms r
    JOIN users i ON i.id = r.initiator_id
    JOIN users a ON a.id = r.acceptor_id
"#;

const REQUEST_SELECT: &str = r#"
    SELECT q.id, q.request_from AS from_id, f.username AS from_username,
           q.request_to AS to_id, t.username AS to_username, q.status, q.created_at
    FROM interest_requests q
    JOIN users f ON f.id = q.request_from
    JOIN users t ON t.id = q.request_to
"#;

/// Storage backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_request(&self, id: Uuid) -> StoreResult<Option<InterestRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(&format!("{REQUEST_SELECT} WHERE q.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(InterestRequest::try_from).transpose()
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<UserProfile> {
        let result = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(e) => {
                let err = StoreError::from(e);
                if err.is_conflict() {
                    Err(StoreError::Conflict(format!("username {}", user.username)))
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Identity>> {
        let row: Option<(Uuid, String)> =
            sqlx::query_as("SELECT id, username FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, username)| Identity::new(UserId(id), username)))
    }

    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<Identity>> {
        let row: Option<(Uuid, String)> =
            sqlx::query_as("SELECT id, username FROM users WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, username)| Identity::new(UserId(id), username)))
    }

    async fn profile(&self, id: UserId) -> StoreResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn credentials(&self, username: &str) -> StoreResult<Option<(UserProfile, String)>> {
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| (r.user.into(), r.password_hash)))
    }

    async fn list_users_except(&self, id: UserId) -> StoreResult<Vec<UserProfile>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id <> $1 ORDER BY username ASC"
        ))
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn add_friends(&self, a: UserId, b: UserId) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO friendships (user_id, friend_id)
            VALUES ($1, $2), ($2, $1)
            ON CONFLICT (user_id, friend_id) DO NOTHING
            "#,
        )
        .bind(a.0)
        .bind(b.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn friends_of(&self, id: UserId) -> StoreResult<Vec<UserProfile>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.created_at
            FROM friendships f
            JOIN users u ON u.id = f.friend_id
            WHERE f.user_id = $1
            ORDER BY u.username ASC
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl RequestStore for PgStore {
    async fn create_request(&self, from: &Identity, to: &Identity) -> StoreResult<InterestRequest> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO interest_requests (id, request_from, request_to, status)
            VALUES ($1, $2, $3, 'pending')
            "#,
        )
        .bind(id)
        .bind(from.id.0)
        .bind(to.id.0)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            let err = StoreError::from(e);
            return Err(if err.is_conflict() {
                StoreError::Conflict("interest request".to_string())
            } else {
                err
            });
        }

        self.fetch_request(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("interest request {id}")))
    }

    async fn find_request(&self, id: Uuid) -> StoreResult<Option<InterestRequest>> {
        self.fetch_request(id).await
    }

    async fn set_request_status(&self, id: Uuid, status: RequestStatus) -> StoreResult<InterestRequest> {
        let updated = sqlx::query("UPDATE interest_requests SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("interest request {id}")));
        }

        self.fetch_request(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("interest request {id}")))
    }

    async fn pending_requests_to(&self, user: UserId) -> StoreResult<Vec<InterestRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            "{REQUEST_SELECT} WHERE q.request_to = $1 AND q.status = 'pending' ORDER BY q.created_at ASC"
        ))
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(InterestRequest::try_from).collect()
    }

    async fn request_exists(&self, from: UserId, to: UserId) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM interest_requests WHERE request_from = $1 AND request_to = $2)",
        )
        .bind(from.0)
        .bind(to.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl RoomDirectory for PgStore {
    async fn create_room(&self, initiator: &Identity, acceptor: &Identity) -> StoreResult<Room> {
        if initiator.id == acceptor.id {
            return Err(StoreError::Invalid(
                "a room needs two distinct participants".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO chat_rooms (id, initiator_id, acceptor_id)
            VALUES ($1, $2, $3)
            ON CONFLICT ((LEAST(initiator_id, acceptor_id)), (GREATEST(initiator_id, acceptor_id)))
            DO NOTHING
            "#,
        )
        .bind(RoomId::generate().0)
        .bind(initiator.id.0)
        .bind(acceptor.id.0)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, RoomRow>(&format!(
            r#"{ROOM_SELECT}
            WHERE LEAST(r.initiator_id, r.acceptor_id) = LEAST($1::uuid, $2::uuid)
              AND GREATEST(r.initiator_id, r.acceptor_id) = GREATEST($1::uuid, $2::uuid)"#
        ))
        .bind(initiator.id.0)
        .bind(acceptor.id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_room(&self, id: &RoomId) -> StoreResult<Option<Room>> {
        let row = sqlx::query_as::<_, RoomRow>(&format!("{ROOM_SELECT} WHERE r.id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn rooms_for_user(&self, user: UserId) -> StoreResult<Vec<Room>> {
        let rows = sqlx::query_as::<_, RoomRow>(&format!(
            "{ROOM_SELECT} WHERE r.initiator_id = $1 OR r.acceptor_id = $1 ORDER BY r.created_at ASC"
        ))
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn create_message(&self, message: NewMessage) -> StoreResult<ChatMessage> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent writers to the same room
        let locked: Option<(String,)> =
            sqlx::query_as("SELECT id FROM chat_rooms WHERE id = $1 FOR UPDATE")
                .bind(message.room_id.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("room {}", message.room_id)));
        }

        let (id, created_at): (i64, OffsetDateTime) = sqlx::query_as(
            r#"
            INSERT INTO chat_messages (room_id, sender_id, text, created_at)
            VALUES (
                $1, $2, $3,
                GREATEST(
                    $4::timestamptz,
                    COALESCE((SELECT MAX(created_at) FROM chat_messages WHERE room_id = $1), $4::timestamptz)
                )
            )
            RETURNING id, created_at
            "#,
        )
        .bind(message.room_id.as_str())
        .bind(message.sender.id.0)
        .bind(&message.text)
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ChatMessage {
            id,
            room_id: message.room_id,
            sender: message.sender,
            text: message.text,
            created_at,
        })
    }

    async fn list_messages(&self, room_id: &RoomId) -> StoreResult<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.id, m.room_id, m.sender_id, u.username AS sender_username, m.text, m.created_at
            FROM chat_messages m
            JOIN users u ON u.id = m.sender_id
            WHERE m.room_id = $1
            ORDER BY m.created_at ASC, m.id ASC
            "#,
        )
        .bind(room_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, 2).await.expect("Failed to create pool");
        crate::db::run_migrations(&pool).await.expect("migrations failed");
        PgStore::new(pool)
    }

    async fn user(store: &PgStore, prefix: &str) -> Identity {
        let username = format!("{prefix}_{}", Uuid::new_v4().simple());
        store
            .create_user(NewUser {
                email: format!("{username}@example.com"),
                username,
                password_hash: "hash".to_string(),
                first_name: prefix.to_string(),
                last_name: "Test".to_string(),
            })
            .await
            .unwrap()
            .identity()
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_room_creation_is_idempotent() {
        let store = store().await;
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;

        let first = store.create_room(&alice, &bob).await.unwrap();
        let second = store.create_room(&bob, &alice).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_message_round_trip() {
        let store = store().await;
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let room = store.create_room(&alice, &bob).await.unwrap();

        let sent = store
            .create_message(NewMessage {
                room_id: room.id.clone(),
                sender: alice.clone(),
                text: "hello".to_string(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();

        let history = store.list_messages(&room.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, sent.id);
        assert_eq!(history[0].sender, alice);
        assert_eq!(history[0].text, "hello");
    }
}
