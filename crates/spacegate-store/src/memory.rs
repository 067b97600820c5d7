//! In-memory implementations of the storage capabilities.
//!
//! Primarily for testing. Same semantics as SQLite, no persistence.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use spacegate_core::{PublicKey, Timeframe};

use crate::error::{Result, StoreError};
use crate::metadata::SpaceMetadata;
use crate::traits::{snapshot_id, MetadataStore, SnapshotStore};

/// In-memory metadata store. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    spaces: RwLock<Vec<SpaceMetadata>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, key: &PublicKey, f: F) -> Result<()>
    where
        F: FnOnce(&mut SpaceMetadata),
    {
        let mut spaces = self.spaces.write().unwrap_or_else(|e| e.into_inner());
        let space = spaces
            .iter_mut()
            .find(|s| s.key == *key)
            .ok_or_else(|| StoreError::NotFound(key.to_hex()))?;
        f(space);
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    async fn spaces(&self) -> Result<Vec<SpaceMetadata>> {
        Ok(self.spaces.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn get_space(&self, key: &PublicKey) -> Result<Option<SpaceMetadata>> {
        let spaces = self.spaces.read().unwrap_or_else(|e| e.into_inner());
        Ok(spaces.iter().find(|s| s.key == *key).cloned())
    }

    async fn add_space(&self, metadata: SpaceMetadata) -> Result<()> {
        let mut spaces = self.spaces.write().unwrap_or_else(|e| e.into_inner());
        if spaces.iter().any(|s| s.key == metadata.key) {
            return Err(StoreError::AlreadyExists(metadata.key.to_hex()));
        }
        spaces.push(metadata);
        Ok(())
    }

    async fn set_latest_timeframe(&self, key: &PublicKey, timeframe: Timeframe) -> Result<()> {
        self.update(key, |space| space.latest_timeframe = Some(timeframe))
    }

    async fn set_snapshot_ref(&self, key: &PublicKey, snapshot_ref: String) -> Result<()> {
        self.update(key, |space| space.snapshot_ref = Some(snapshot_ref))
    }

    async fn clear(&self) -> Result<()> {
        self.spaces.write().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }
}

/// In-memory snapshot store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    blobs: RwLock<BTreeMap<String, Bytes>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save_snapshot(&self, data: Bytes) -> Result<String> {
        let id = snapshot_id(&data);
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn load_snapshot(&self, id: &str) -> Result<Option<Bytes>> {
        Ok(self
            .blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned())
    }

    async fn list_snapshots(&self) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> PublicKey {
        PublicKey::from_bytes([b; 32])
    }

    #[tokio::test]
    async fn test_add_space_rejects_duplicate() {
        let store = MemoryMetadataStore::new();
        store.add_space(SpaceMetadata::new(key(1), key(2), key(3))).await.unwrap();

        let again = store.add_space(SpaceMetadata::new(key(1), key(4), key(5))).await;
        assert!(matches!(again, Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.spaces().await.unwrap()[0].control_feed_key, key(2));
    }

    #[tokio::test]
    async fn test_updates_and_clear() {
        let store = MemoryMetadataStore::new();
        store.add_space(SpaceMetadata::new(key(1), key(2), key(3))).await.unwrap();
        store.add_space(SpaceMetadata::new(key(9), key(8), key(7))).await.unwrap();

        let tf: Timeframe = [(key(3), 4)].into_iter().collect();
        store.set_latest_timeframe(&key(1), tf.clone()).await.unwrap();
        store.set_snapshot_ref(&key(1), "snap".into()).await.unwrap();

        let space = store.get_space(&key(1)).await.unwrap().unwrap();
        assert_eq!(space.latest_timeframe, Some(tf));
        assert_eq!(space.snapshot_ref.as_deref(), Some("snap"));

        let keys: Vec<_> = store.spaces().await.unwrap().iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![key(1), key(9)]);

        assert!(store.set_snapshot_ref(&key(5), "x".into()).await.is_err());

        store.clear().await.unwrap();
        assert!(store.spaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_content_addressed() {
        let store = MemorySnapshotStore::new();
        let a = store.save_snapshot(Bytes::from_static(b"alpha")).await.unwrap();
        let b = store.save_snapshot(Bytes::from_static(b"alpha")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, snapshot_id(b"alpha"));

        assert_eq!(
            store.load_snapshot(&a).await.unwrap(),
            Some(Bytes::from_static(b"alpha"))
        );
        assert_eq!(store.load_snapshot("missing").await.unwrap(), None);
        assert_eq!(store.list_snapshots().await.unwrap(), vec![a]);
    }
}
