//! Errors raised inside the real-time core

use tandem_shared::StoreError;

use super::backbone::BackboneError;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Connection is not authenticated")]
    Unauthenticated,

    #[error("Not a participant of this room")]
    NotAMember,

    #[error("Operation not permitted")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Backbone(#[from] BackboneError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ChatResult<T> = Result<T, ChatError>;
