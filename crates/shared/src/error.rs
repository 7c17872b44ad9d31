//! Error types for Tandem storage collaborators

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Invalid data: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the error came from a unique constraint violation
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::Conflict(_) => true,
            StoreError::Database(sqlx::Error::Database(db_err)) => {
                // PostgreSQL unique violation
                db_err.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
