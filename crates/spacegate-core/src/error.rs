//! Error types for the core primitives.

use thiserror::Error;

/// Errors that can occur while handling keys and credentials.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("no private key for {0}")]
    KeyNotFound(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
