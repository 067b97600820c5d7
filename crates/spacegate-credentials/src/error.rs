//! Error types for the credentials module.

use spacegate_core::{AssertionType, PublicKey};
use thiserror::Error;

/// Errors raised by the state machine and its consumers.
///
/// Credential rejections are not errors; `process` reports them as `false`.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The same processor was registered twice.
    #[error("credential processor already added")]
    ProcessorAlreadyAdded,

    /// The consumer's scope was disposed before it could open.
    #[error("credential processor is disposed")]
    Disposed(#[from] spacegate_async::AsyncError),

    /// A feed key was admitted a second time.
    #[error("feed already admitted: {0}")]
    FeedAlreadyAdmitted(PublicKey),

    /// A sub-state-machine was handed the wrong assertion.
    #[error("unexpected assertion: expected {expected:?}, got {got:?}")]
    UnexpectedAssertion {
        expected: AssertionType,
        got: AssertionType,
    },

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] spacegate_core::CoreError),
}

/// Result type for credential operations.
pub type Result<T> = std::result::Result<T, CredentialsError>;
