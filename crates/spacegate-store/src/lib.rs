//! # Spacegate Store
//!
//! Storage capabilities for the space lifecycle manager, with SQLite and
//! in-memory implementations.
//!
//! ## Key Types
//!
//! - [`MetadataStore`] - Durable list of spaces and replay checkpoints
//! - [`SnapshotStore`] - Content-addressed snapshot blobs
//! - [`Keyring`] - Key generation and signing
//! - [`SqliteStore`] - SQLite-based persistent metadata and snapshots
//! - [`FeedStore`] - In-process append-only feeds
//!
//! ## Usage
//!
//! ```rust,no_run
//! use spacegate_store::{MetadataStore, SpaceMetadata, SqliteStore};
//! use spacegate_core::PublicKey;
//!
//! async fn example(space: PublicKey, control: PublicKey, data: PublicKey) {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("spacegate.db").unwrap();
//!     store.load().await.unwrap();
//!
//!     store.add_space(SpaceMetadata::new(space, control, data)).await.unwrap();
//! }
//! ```

pub mod error;
pub mod feed;
pub mod keyring;
pub mod memory;
pub mod metadata;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use feed::{Feed, FeedHead, FeedReader, FeedStore};
pub use keyring::MemoryKeyring;
pub use memory::{MemoryMetadataStore, MemorySnapshotStore};
pub use metadata::SpaceMetadata;
pub use sqlite::SqliteStore;
pub use traits::{snapshot_id, Keyring, MetadataStore, SnapshotStore};
