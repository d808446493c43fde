//! Persistence error types

use thiserror::Error;

/// Failures from the user store or the key-value store
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    /// Key-value store unreachable or returned an unexpected reply
    #[error("KV store error: {0}")]
    Kv(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique email or Telegram id already taken
    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    /// The backing store could not be reached; retrying later may succeed.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Kv(_) => true,
            Self::Query(e) => matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)),
            _ => false,
        }
    }
}

impl From<deadpool_redis::PoolError> for DbError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        DbError::Kv(e.to_string())
    }
}

impl From<redis::RedisError> for DbError {
    fn from(e: redis::RedisError) -> Self {
        DbError::Kv(e.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
