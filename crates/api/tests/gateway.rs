//! End-to-end behaviour of the real-time gateway.
//!
//! Every test drives `handle_client_event` directly against in-memory storage
//! and an in-memory backbone. Tests that need several server instances build
//! more than one `WebSocketState` over the same store and backbone.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tandem_api::{
    auth::JwtManager,
    websocket::{
        handle_client_event, on_request_accepted, ClientEvent, Collaborators, Connection,
        GatewaySettings, InMemoryBackbone, MessageView, ServerEvent, WebSocketState,
    },
};
use tandem_shared::{
    ChatMessage, Identity, MemoryStore, MessageStore, NewMessage, NewUser, RoomDirectory, RoomId,
    StoreError, StoreResult, UserDirectory,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

const SECRET: &str = "gateway-test-secret-at-least-32-chars";

struct Cluster {
    store: Arc<MemoryStore>,
    backbone: Arc<InMemoryBackbone>,
    jwt: JwtManager,
}

impl Cluster {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            backbone: Arc::new(InMemoryBackbone::new()),
            jwt: JwtManager::new(SECRET, 1),
        }
    }

    /// A fresh gateway instance sharing this cluster's store and backbone
    fn instance(&self) -> WebSocketState {
        self.instance_with(Collaborators::from_store(self.store.clone()))
    }

    fn instance_with(&self, collaborators: Collaborators) -> WebSocketState {
        WebSocketState::new(
            collaborators,
            self.backbone.clone(),
            self.jwt.clone(),
            GatewaySettings {
                idle_timeout: None,
                max_message_length: 200,
            },
        )
    }

    async fn user(&self, username: &str) -> Identity {
        self.store
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: "unused".to_string(),
                first_name: username.to_string(),
                last_name: "Test".to_string(),
            })
            .await
            .unwrap()
            .identity()
    }

    async fn room(&self, a: &Identity, b: &Identity) -> RoomId {
        on_request_accepted(&*self.store, a, b).await.unwrap()
    }
}

struct Client {
    conn: Arc<Connection>,
    events: UnboundedReceiver<ServerEvent>,
    state: WebSocketState,
}

impl Client {
    async fn connect(state: &WebSocketState, identity: Option<&Identity>) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let conn = match identity {
            Some(identity) => Connection::authenticated(identity.clone(), tx),
            None => Connection::new(tx),
        };
        let conn = state.sessions.register(conn).await;
        Self {
            conn,
            events,
            state: state.clone(),
        }
    }

    async fn send(&self, event: ClientEvent) {
        handle_client_event(event, &self.conn, &self.state).await;
    }

    async fn join(&mut self, room_id: &RoomId) {
        self.send(ClientEvent::JoinRoom {
            room_id: room_id.clone(),
        })
        .await;
        assert_eq!(self.next().await, ServerEvent::room_joined(room_id.clone()));
    }

    async fn say(&self, room_id: &RoomId, text: &str) {
        self.send(ClientEvent::SendMessage {
            room_id: room_id.clone(),
            text: text.to_string(),
            sender: None,
        })
        .await;
    }

    async fn disconnect(self) {
        self.state.sessions.unregister(&self.conn.session_id).await;
    }

    async fn next(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn next_message(&mut self) -> MessageView {
        match self.next().await {
            ServerEvent::MessageReceived { message } => message,
            other => panic!("expected message_received, got {other:?}"),
        }
    }

    /// Assert nothing arrives within a short window
    async fn assert_silent(&mut self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(event) = self.events.try_recv() {
            panic!("expected no event, got {event:?}");
        }
    }
}

#[tokio::test]
async fn test_alice_and_bob_chat() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let room = cluster.room(&alice, &bob).await;

    let server = cluster.instance();
    let mut alice_client = Client::connect(&server, Some(&alice)).await;
    let mut bob_client = Client::connect(&server, Some(&bob)).await;
    alice_client.join(&room).await;
    bob_client.join(&room).await;

    alice_client.say(&room, "hi bob").await;
    for client in [&mut alice_client, &mut bob_client] {
        let message = client.next_message().await;
        assert_eq!(message.sender, "alice");
        assert_eq!(message.text, "hi bob");
    }

    bob_client.say(&room, "hi alice").await;
    for client in [&mut alice_client, &mut bob_client] {
        let message = client.next_message().await;
        assert_eq!(message.sender, "bob");
        assert_eq!(message.text, "hi alice");
    }
}

#[tokio::test]
async fn test_join_only_for_participants() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let eve = cluster.user("eve").await;
    let room = cluster.room(&alice, &bob).await;
    let server = cluster.instance();

    let mut intruder = Client::connect(&server, Some(&eve)).await;
    intruder
        .send(ClientEvent::JoinRoom {
            room_id: room.clone(),
        })
        .await;
    intruder.assert_silent().await;
    assert_eq!(server.rooms.room_size(&room).await, 0);
    assert!(!intruder.conn.is_in_room(&room).await);

    let mut member = Client::connect(&server, Some(&bob)).await;
    member.join(&room).await;
    assert_eq!(server.rooms.room_size(&room).await, 1);

    // Unknown rooms are ignored too
    member
        .send(ClientEvent::JoinRoom {
            room_id: RoomId::from("does-not-exist"),
        })
        .await;
    member.assert_silent().await;
}

#[tokio::test]
async fn test_every_connection_sees_send_order_across_instances() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let room = cluster.room(&alice, &bob).await;

    let first = cluster.instance();
    let second = cluster.instance();

    let mut alice_phone = Client::connect(&first, Some(&alice)).await;
    let mut alice_laptop = Client::connect(&second, Some(&alice)).await;
    let mut bob_client = Client::connect(&second, Some(&bob)).await;
    alice_phone.join(&room).await;
    alice_laptop.join(&room).await;
    bob_client.join(&room).await;

    let texts: Vec<String> = (0..10).map(|n| format!("message {n}")).collect();
    for (n, text) in texts.iter().enumerate() {
        if n % 2 == 0 {
            alice_phone.say(&room, text).await;
        } else {
            bob_client.say(&room, text).await;
        }
    }

    for client in [&mut alice_phone, &mut alice_laptop, &mut bob_client] {
        let mut received = Vec::new();
        for _ in 0..texts.len() {
            received.push(client.next_message().await);
        }
        let received_texts: Vec<&str> = received.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(received_texts, texts.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(received.windows(2).all(|w| w[0].id < w[1].id));
        client.assert_silent().await;
    }
}

#[tokio::test]
async fn test_reconnect_requires_rejoin_and_skips_missed_messages() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let room = cluster.room(&alice, &bob).await;
    let server = cluster.instance();

    let mut alice_client = Client::connect(&server, Some(&alice)).await;
    alice_client.join(&room).await;

    let mut bob_client = Client::connect(&server, Some(&bob)).await;
    bob_client.join(&room).await;
    bob_client.disconnect().await;

    alice_client.say(&room, "while you were away").await;
    alice_client.next_message().await;

    let mut bob_again = Client::connect(&server, Some(&bob)).await;
    alice_client.say(&room, "before you rejoined").await;
    alice_client.next_message().await;
    bob_again.assert_silent().await;

    bob_again.join(&room).await;
    alice_client.say(&room, "welcome back").await;
    assert_eq!(bob_again.next_message().await.text, "welcome back");
    bob_again.assert_silent().await;

    // History still has everything
    let history = cluster.store.list_messages(&room).await.unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn test_sent_messages_appear_in_history_in_order() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let room = cluster.room(&alice, &bob).await;
    let server = cluster.instance();

    let mut alice_client = Client::connect(&server, Some(&alice)).await;
    alice_client.join(&room).await;

    let mut delivered = Vec::new();
    for text in ["one", "two", "three"] {
        alice_client.say(&room, text).await;
        delivered.push(alice_client.next_message().await);
    }

    let history: Vec<MessageView> = cluster
        .store
        .list_messages(&room)
        .await
        .unwrap()
        .iter()
        .map(MessageView::from)
        .collect();
    assert_eq!(history, delivered);
}

#[tokio::test]
async fn test_non_participant_send_is_neither_stored_nor_broadcast() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let eve = cluster.user("eve").await;
    let room = cluster.room(&alice, &bob).await;
    let server = cluster.instance();

    let mut alice_client = Client::connect(&server, Some(&alice)).await;
    alice_client.join(&room).await;

    let mut eve_client = Client::connect(&server, Some(&eve)).await;
    eve_client.say(&room, "let me in").await;

    // The claimed sender does not matter either
    eve_client
        .send(ClientEvent::SendMessage {
            room_id: room.clone(),
            text: "it's me, bob".to_string(),
            sender: Some("bob".to_string()),
        })
        .await;

    alice_client.assert_silent().await;
    eve_client.assert_silent().await;
    assert!(cluster.store.list_messages(&room).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_claimed_sender_is_replaced_by_session_identity() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let room = cluster.room(&alice, &bob).await;
    let server = cluster.instance();

    let mut bob_client = Client::connect(&server, Some(&bob)).await;
    bob_client.join(&room).await;

    bob_client
        .send(ClientEvent::SendMessage {
            room_id: room.clone(),
            text: "signed by alice".to_string(),
            sender: Some("alice".to_string()),
        })
        .await;

    assert_eq!(bob_client.next_message().await.sender, "bob");
}

#[tokio::test]
async fn test_empty_text_is_rejected() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let room = cluster.room(&alice, &bob).await;
    let server = cluster.instance();

    let mut alice_client = Client::connect(&server, Some(&alice)).await;
    alice_client.join(&room).await;

    alice_client.say(&room, "").await;
    alice_client.say(&room, "  \n ").await;
    alice_client.say(&room, &"x".repeat(201)).await;

    alice_client.assert_silent().await;
    assert!(cluster.store.list_messages(&room).await.unwrap().is_empty());
}

/// Message store that refuses every write
struct FailingMessages;

#[async_trait]
impl MessageStore for FailingMessages {
    async fn create_message(&self, _message: NewMessage) -> StoreResult<ChatMessage> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn list_messages(&self, _room_id: &RoomId) -> StoreResult<Vec<ChatMessage>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_persistence_failure_means_no_broadcast() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let room = cluster.room(&alice, &bob).await;

    let broken = cluster.instance_with(Collaborators {
        users: cluster.store.clone(),
        rooms: cluster.store.clone(),
        messages: Arc::new(FailingMessages),
    });
    let healthy = cluster.instance();

    let mut alice_client = Client::connect(&broken, Some(&alice)).await;
    let mut bob_client = Client::connect(&healthy, Some(&bob)).await;
    alice_client.join(&room).await;
    bob_client.join(&room).await;

    alice_client.say(&room, "lost").await;

    alice_client.assert_silent().await;
    bob_client.assert_silent().await;

    // Connection stays usable
    alice_client.send(ClientEvent::Ping).await;
    assert_eq!(alice_client.next().await, ServerEvent::Pong);
}

#[tokio::test]
async fn test_unauthenticated_connection_must_authenticate_first() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let room = cluster.room(&alice, &bob).await;
    let server = cluster.instance();

    let mut client = Client::connect(&server, None).await;

    client.send(ClientEvent::Ping).await;
    assert_eq!(client.next().await, ServerEvent::Pong);

    client
        .send(ClientEvent::JoinRoom {
            room_id: room.clone(),
        })
        .await;
    client.say(&room, "anyone?").await;
    client.assert_silent().await;

    client
        .send(ClientEvent::Authenticate {
            token: "not-a-token".to_string(),
        })
        .await;
    client.assert_silent().await;

    let token = cluster.jwt.generate_access_token(&alice).unwrap();
    client.send(ClientEvent::Authenticate { token }).await;
    assert_eq!(
        client.next().await,
        ServerEvent::Authenticated {
            username: "alice".to_string()
        }
    );

    // A second identity cannot take over the session
    let bob_token = cluster.jwt.generate_access_token(&bob).unwrap();
    client.send(ClientEvent::Authenticate { token: bob_token }).await;
    client.assert_silent().await;

    client.join(&room).await;
    client.say(&room, "hello").await;
    assert_eq!(client.next_message().await.sender, "alice");
}

#[tokio::test]
async fn test_leave_room_stops_delivery() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let room = cluster.room(&alice, &bob).await;
    let server = cluster.instance();

    let mut alice_client = Client::connect(&server, Some(&alice)).await;
    let mut bob_client = Client::connect(&server, Some(&bob)).await;
    alice_client.join(&room).await;
    bob_client.join(&room).await;

    bob_client
        .send(ClientEvent::LeaveRoom {
            room_id: room.clone(),
        })
        .await;
    assert!(!bob_client.conn.is_in_room(&room).await);

    alice_client.say(&room, "still there?").await;
    alice_client.next_message().await;
    bob_client.assert_silent().await;

    // Leaving also works for the last member
    alice_client
        .send(ClientEvent::LeaveRoom {
            room_id: room.clone(),
        })
        .await;
    assert_eq!(server.rooms.room_count().await, 0);
    assert_eq!(cluster.backbone.topic_count(), 0);
}

#[tokio::test]
async fn test_duplicate_acceptance_yields_same_room() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;

    let first = cluster.room(&alice, &bob).await;
    let second = cluster.room(&bob, &alice).await;
    assert_eq!(first, second);

    let rooms = cluster.store.rooms_for_user(bob.id).await.unwrap();
    assert_eq!(rooms.len(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let cluster = Cluster::new();
    let alice = cluster.user("alice").await;
    let bob = cluster.user("bob").await;
    let room = cluster.room(&alice, &bob).await;
    let server = cluster.instance();

    let mut client = Client::connect(&server, Some(&alice)).await;
    client.join(&room).await;

    server.shutdown().await;

    assert_eq!(server.stats().await.active_connections, 0);
    assert_eq!(server.rooms.room_count().await, 0);
    assert!(client.conn.identity().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_joiner_never_sees_earlier_messages() {
    for _ in 0..200 {
        let cluster = Cluster::new();
        let alice = cluster.user("alice").await;
        let bob = cluster.user("bob").await;
        let room = cluster.room(&alice, &bob).await;
        let server = cluster.instance();

        let mut alice_client = Client::connect(&server, Some(&alice)).await;
        alice_client.join(&room).await;
        alice_client.say(&room, "before you joined").await;

        let mut bob_client = Client::connect(&server, Some(&bob)).await;
        bob_client.join(&room).await;
        alice_client.say(&room, "after you joined").await;

        assert_eq!(bob_client.next_message().await.text, "after you joined");
        server.shutdown().await;
    }
}
