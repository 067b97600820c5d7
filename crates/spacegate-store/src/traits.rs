//! Storage capabilities consumed by the space lifecycle manager.
//!
//! These traits keep the manager storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use bytes::Bytes;
use spacegate_core::{CredentialSigner, PublicKey, Timeframe};

use crate::error::Result;
use crate::metadata::SpaceMetadata;

/// Durable list of spaces and their replay checkpoints.
///
/// Records are never deleted except by [`MetadataStore::clear`].
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Read persisted state. Called once before other methods.
    async fn load(&self) -> Result<()>;

    /// All recorded spaces, in the order they were added.
    async fn spaces(&self) -> Result<Vec<SpaceMetadata>>;

    /// Look up one space.
    async fn get_space(&self, key: &PublicKey) -> Result<Option<SpaceMetadata>>;

    /// Record a new space. Fails if the key is already recorded.
    async fn add_space(&self, metadata: SpaceMetadata) -> Result<()>;

    /// Record the data pipeline position of a space.
    async fn set_latest_timeframe(&self, key: &PublicKey, timeframe: Timeframe) -> Result<()>;

    /// Record the latest snapshot of a space.
    async fn set_snapshot_ref(&self, key: &PublicKey, snapshot_ref: String) -> Result<()>;

    /// Explicit reset: forget every space.
    async fn clear(&self) -> Result<()>;
}

/// Content-addressed store of opaque snapshot blobs.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store a blob. Returns its id (Blake3 hex of the content).
    async fn save_snapshot(&self, data: Bytes) -> Result<String>;

    async fn load_snapshot(&self, id: &str) -> Result<Option<Bytes>>;

    async fn list_snapshots(&self) -> Result<Vec<String>>;
}

/// Holds private keys and signs with them.
#[async_trait]
pub trait Keyring: CredentialSigner {
    /// Generate and keep a new keypair. Returns its public key.
    async fn create_key(&self) -> Result<PublicKey>;

    async fn has_key(&self, key: &PublicKey) -> bool;
}

/// Snapshot id for a blob.
pub fn snapshot_id(data: &[u8]) -> String {
    spacegate_core::Blake3Hash::hash(data).to_hex()
}
