//! # Spacegate Database
//!
//! Object index for a space, fed by data feed mutations.
//!
//! ## Overview
//!
//! Every admitted data feed carries CBOR-encoded [`EchoEnvelope`]s. The
//! [`ItemDemuxer`] applies them to an [`ItemManager`], tracking per-feed
//! progress as a [`Timeframe`](spacegate_core::Timeframe). Snapshots bound
//! replay: a restored snapshot carries the timeframe it reflects, and
//! messages at or below it are skipped.
//!
//! ## Key Types
//!
//! - [`DatabaseBackend`]: connects an index to its source of mutations
//! - [`FeedDatabaseBackend`]: local feeds in, local data feed out
//! - [`RemoteDatabaseBackend`]: writes forwarded to a [`DataService`], reads mirrored
//! - [`DataServiceHost`] / [`DataServiceSubscriptions`]: serve a space to remote clients
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spacegate_database::{Database, FeedDatabaseBackend, ModelRegistry};
//!
//! # async fn demo() -> spacegate_database::Result<()> {
//! let (tx, rx) = tokio::sync::mpsc::channel(1024);
//! let backend = Arc::new(FeedDatabaseBackend::new(rx, None, None));
//! let database = Database::new(backend, Arc::new(ModelRegistry::new()));
//! database.open().await?;
//! // Feed messages sent on `tx` now land in `database.items()`.
//! # drop(tx);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod database;
pub mod demuxer;
pub mod error;
pub mod item;
pub mod mirror;
pub mod model;
pub mod mutation;
pub mod service;
pub mod snapshot;
pub mod writer;

pub use backend::{DatabaseBackend, FeedDatabaseBackend, RemoteDatabaseBackend};
pub use database::Database;
pub use demuxer::ItemDemuxer;
pub use error::{DatabaseError, Result};
pub use item::{Item, ItemId, ItemManager, ItemUpdate, ItemUpdateKind};
pub use mirror::DataMirror;
pub use model::{ModelRegistry, OBJECT_MODEL};
pub use mutation::{EchoEnvelope, FeedMessage, ItemMutation};
pub use service::{
    DataService, DataServiceHost, DataServiceSubscriptions, DataSubscription, LocalDataService,
    WriteAck,
};
pub use snapshot::{DatabaseSnapshot, ItemSnapshot};
pub use writer::{FeedStoreWriter, FeedWriter, WriteReceipt};
