//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Metadata serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Space, snapshot or key not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A space with this key is already recorded.
    #[error("space already exists: {0}")]
    AlreadyExists(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),

    /// Append to a closed feed.
    #[error("feed closed: {0}")]
    FeedClosed(String),

    /// Core error (signing with a missing key).
    #[error("core error: {0}")]
    Core(#[from] spacegate_core::CoreError),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
