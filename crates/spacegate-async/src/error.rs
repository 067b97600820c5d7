//! Error types for async coordination.

use thiserror::Error;

/// Errors raised by cancellation scopes and timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsyncError {
    #[error("context disposed: {0}")]
    Disposed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out: {what}")]
    Timeout { what: String },
}

/// Result type for async coordination.
pub type Result<T> = std::result::Result<T, AsyncError>;
