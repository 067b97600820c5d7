//! Snapshot persistence and the object sync extension.

use std::sync::Arc;

use bytes::Bytes;
use spacegate_core::PublicKey;
use spacegate_database::DatabaseSnapshot;
use spacegate_store::SnapshotStore;
use tracing::debug;

use crate::error::Result;

/// Saves and loads database snapshots.
#[derive(Clone)]
pub struct SnapshotManager {
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotManager {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// Store a snapshot. Returns its id.
    pub async fn save(&self, snapshot: &DatabaseSnapshot) -> Result<String> {
        let id = self.store.save_snapshot(snapshot.to_bytes()?).await?;
        debug!(snapshot = %id, items = snapshot.items.len(), "saved snapshot");
        Ok(id)
    }

    pub async fn load(&self, id: &str) -> Result<Option<DatabaseSnapshot>> {
        match self.store.load_snapshot(id).await? {
            Some(bytes) => Ok(Some(DatabaseSnapshot::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn object_sync(&self) -> ObjectSync {
        ObjectSync {
            store: self.store.clone(),
        }
    }
}

/// Serves snapshot blobs to peers.
#[derive(Clone)]
pub struct ObjectSync {
    store: Arc<dyn SnapshotStore>,
}

impl ObjectSync {
    pub fn create_extension(&self, remote_peer_id: PublicKey) -> ObjectSyncExtension {
        ObjectSyncExtension {
            store: self.store.clone(),
            remote_peer_id,
        }
    }
}

/// Object sync protocol on one session.
pub struct ObjectSyncExtension {
    store: Arc<dyn SnapshotStore>,
    remote_peer_id: PublicKey,
}

impl ObjectSyncExtension {
    pub fn remote_peer_id(&self) -> &PublicKey {
        &self.remote_peer_id
    }

    /// Answer a peer's request for a blob.
    pub async fn handle_request(&self, id: &str) -> Result<Option<Bytes>> {
        debug!(peer_id = %self.remote_peer_id, snapshot = %id, "object sync request");
        Ok(self.store.load_snapshot(id).await?)
    }
}
