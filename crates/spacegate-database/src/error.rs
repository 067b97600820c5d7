//! Error types for the database module.

use thiserror::Error;

use crate::item::ItemId;

/// Errors that can occur while applying, writing or restoring objects.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Model type is not registered.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// An item names a parent that does not exist.
    #[error("missing parent {parent} for item {item}")]
    MissingParent { item: ItemId, parent: ItemId },

    /// Mutation for an item that does not exist.
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    /// Genesis for an item that already exists.
    #[error("item already exists: {0}")]
    ItemExists(ItemId),

    /// Operation not supported by this backend.
    #[error("method not supported: {0}")]
    Unsupported(&'static str),

    /// Write acknowledgment without a feed key or sequence number.
    #[error("invalid write acknowledgment: {0}")]
    InvalidAck(String),

    /// Write on a backend without an outbound stream.
    #[error("database is read-only")]
    ReadOnly,

    #[error("backend already open")]
    AlreadyOpen,

    #[error("backend not open")]
    NotOpen,

    /// The applied timeframe stopped publishing before a wait resolved.
    #[error("timeframe publisher closed")]
    TimeframeClosed,

    /// No data service host for the space.
    #[error("unknown space: {0}")]
    UnknownSpace(String),

    /// Encoding error.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Decoding error.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] spacegate_store::StoreError),
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
