//! Tandem Shared Types and Storage
//!
//! Domain types, storage errors and the persistence collaborators used by the
//! chat core and the HTTP API.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use store::{ChatStore, MemoryStore, MessageStore, PgStore, RequestStore, RoomDirectory, UserDirectory};
pub use types::*;
