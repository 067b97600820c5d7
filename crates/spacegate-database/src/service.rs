//! Data service: the write and subscribe surface a space exposes to
//! clients that hold no local copy of its feeds.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use spacegate_core::PublicKey;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{DatabaseError, Result};
use crate::item::{Item, ItemManager, ItemUpdate};
use crate::mutation::EchoEnvelope;
use crate::writer::FeedWriter;

/// Acknowledgment of a remote write.
///
/// Both fields are optional on the wire; a writer must reject an
/// acknowledgment that lacks either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteAck {
    pub feed_key: Option<PublicKey>,
    pub seq: Option<u64>,
}

/// Current items followed by live updates.
pub struct DataSubscription {
    pub initial: Vec<Item>,
    pub updates: broadcast::Receiver<ItemUpdate>,
}

/// Remote access to space databases.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn write(&self, space_key: &PublicKey, envelope: EchoEnvelope) -> Result<WriteAck>;

    async fn subscribe(&self, space_key: &PublicKey) -> Result<DataSubscription>;
}

/// Serves one space's database.
pub struct DataServiceHost {
    items: Arc<ItemManager>,
    writer: Option<Arc<dyn FeedWriter>>,
}

impl DataServiceHost {
    pub fn new(items: Arc<ItemManager>, writer: Option<Arc<dyn FeedWriter>>) -> Self {
        Self { items, writer }
    }

    pub async fn write(&self, envelope: &EchoEnvelope) -> Result<WriteAck> {
        let writer = self.writer.as_ref().ok_or(DatabaseError::ReadOnly)?;
        let receipt = writer.write(envelope).await?;
        Ok(WriteAck {
            feed_key: Some(receipt.feed_key),
            seq: Some(receipt.seq),
        })
    }

    /// Subscribes before reading the index, so an update racing the read is
    /// seen at least once.
    pub fn subscribe(&self) -> DataSubscription {
        let updates = self.items.subscribe();
        DataSubscription {
            initial: self.items.items(),
            updates,
        }
    }
}

/// Data service hosts keyed by space.
#[derive(Default)]
pub struct DataServiceSubscriptions {
    hosts: RwLock<HashMap<PublicKey, Arc<DataServiceHost>>>,
}

impl DataServiceSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host, replacing any previous host for the space.
    pub fn register_space(&self, space_key: PublicKey, host: Arc<DataServiceHost>) {
        debug!(space_key = %space_key, "registered data service host");
        self.hosts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(space_key, host);
    }

    pub fn unregister_space(&self, space_key: &PublicKey) -> bool {
        self.hosts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(space_key)
            .is_some()
    }

    pub fn get(&self, space_key: &PublicKey) -> Option<Arc<DataServiceHost>> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(space_key)
            .cloned()
    }

    pub fn spaces(&self) -> Vec<PublicKey> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    fn host(&self, space_key: &PublicKey) -> Result<Arc<DataServiceHost>> {
        self.get(space_key)
            .ok_or_else(|| DatabaseError::UnknownSpace(space_key.to_hex()))
    }
}

/// In-process [`DataService`] over a host registry.
#[derive(Clone)]
pub struct LocalDataService {
    subscriptions: Arc<DataServiceSubscriptions>,
}

impl LocalDataService {
    pub fn new(subscriptions: Arc<DataServiceSubscriptions>) -> Self {
        Self { subscriptions }
    }
}

#[async_trait]
impl DataService for LocalDataService {
    async fn write(&self, space_key: &PublicKey, envelope: EchoEnvelope) -> Result<WriteAck> {
        self.subscriptions.host(space_key)?.write(&envelope).await
    }

    async fn subscribe(&self, space_key: &PublicKey) -> Result<DataSubscription> {
        Ok(self.subscriptions.host(space_key)?.subscribe())
    }
}
