//! # Spacegate
//!
//! Collaboration spaces authorized by credentials and replicated as feeds.
//!
//! ## Overview
//!
//! A space is founded by a genesis credential on its control feed. Every
//! device replays the control feeds through a
//! [`SpaceStateMachine`](spacegate_credentials::SpaceStateMachine) to learn
//! the members and admitted feeds, and replays the admitted data feeds into
//! an object database.
//!
//! ## Key Types
//!
//! - [`SpaceServices`]: top-level client; builds stores and the manager
//! - [`DataSpaceManager`]: creates, accepts, opens and closes spaces
//! - [`DataSpace`]: one space with its control pipeline, database and presence
//! - [`Space`]: the control pipeline
//!
//! ## Usage
//!
//! ```rust,no_run
//! use spacegate::{ServicesConfig, SpaceServices};
//!
//! # async fn demo() -> spacegate::Result<()> {
//! let services = SpaceServices::in_memory(ServicesConfig::default());
//! services.open().await?;
//!
//! let space = services.manager().create_space().await?;
//! let (item, _) = space
//!     .database()
//!     .create_item("spacegate:object", None, Default::default())
//!     .await?;
//! # let _ = item;
//! services.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Re-exports
//!
//! - `spacegate::core` - Keys, credentials, timeframes
//! - `spacegate::credentials` - Space state machine
//! - `spacegate::store` - Metadata, snapshot and feed stores
//! - `spacegate::database` - Object database and backends

pub mod config;
pub mod data_pipeline;
pub mod data_space;
pub mod error;
pub mod logging;
pub mod manager;
pub mod network;
pub mod presence;
pub mod services;
pub mod signing;
pub mod snapshot;
pub mod space;

pub use spacegate_core as core;
pub use spacegate_credentials as credentials;
pub use spacegate_database as database;
pub use spacegate_store as store;

pub use config::{PresenceConfig, ServicesConfig};
pub use data_pipeline::DataPipeline;
pub use data_space::{DataSpace, DataSpaceParams, DataSpaceState};
pub use error::{Result, SpaceError};
pub use logging::{init_logging, LogConfig};
pub use manager::{AcceptSpaceOptions, DataSpaceManager};
pub use network::{
    MemorySession, NetworkSession, SessionExtension, OBJECT_SYNC_EXTENSION, PRESENCE_EXTENSION,
};
pub use presence::{Announcement, Presence, PresenceExtension};
pub use services::SpaceServices;
pub use signing::SigningContext;
pub use snapshot::{ObjectSync, ObjectSyncExtension, SnapshotManager};
pub use space::Space;
