//! Error types for spaces and the space manager.

use spacegate_core::PublicKey;
use thiserror::Error;

/// Errors that can occur while running spaces.
#[derive(Debug, Error)]
pub enum SpaceError {
    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] spacegate_core::CoreError),

    /// Scope disposed or work cancelled.
    #[error("async error: {0}")]
    Async(#[from] spacegate_async::AsyncError),

    /// Credential processing error.
    #[error("credentials error: {0}")]
    Credentials(#[from] spacegate_credentials::CredentialsError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] spacegate_store::StoreError),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] spacegate_database::DatabaseError),

    /// Initialization did not finish in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The space is not known to this manager.
    #[error("unknown space: {0}")]
    UnknownSpace(PublicKey),

    /// The space is already known to this manager.
    #[error("space already exists: {0}")]
    SpaceExists(PublicKey),

    /// A timeframe stopped publishing before a wait resolved.
    #[error("timeframe publisher closed")]
    TimeframeClosed,

    #[error("not open")]
    NotOpen,

    #[error("already open")]
    AlreadyOpen,

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Config(String),

    /// Logging could not be installed.
    #[error("logging error: {0}")]
    Logging(String),
}

/// Result type for space operations.
pub type Result<T> = std::result::Result<T, SpaceError>;
