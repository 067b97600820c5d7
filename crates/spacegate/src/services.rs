//! SpaceServices: the top-level client.
//!
//! Builds the stores, feed store, data service registry and
//! [`DataSpaceManager`] from a [`ServicesConfig`].

use std::path::Path;
use std::sync::Arc;

use spacegate_async::{with_timeout, Context};
use spacegate_core::Keypair;
use spacegate_database::{DataService, DataServiceSubscriptions, LocalDataService, ModelRegistry};
use spacegate_store::{
    FeedStore, MemoryKeyring, MemoryMetadataStore, MemorySnapshotStore, MetadataStore,
    SnapshotStore, SqliteStore,
};
use tracing::info;

use crate::config::ServicesConfig;
use crate::error::{Result, SpaceError};
use crate::manager::DataSpaceManager;
use crate::signing::SigningContext;
use crate::snapshot::SnapshotManager;

/// Everything a device needs to run its spaces.
pub struct SpaceServices {
    config: ServicesConfig,
    signing: SigningContext,
    feeds: Arc<FeedStore>,
    subscriptions: Arc<DataServiceSubscriptions>,
    manager: Arc<DataSpaceManager>,
}

impl SpaceServices {
    pub fn new(
        config: ServicesConfig,
        signing: SigningContext,
        metadata_store: Arc<dyn MetadataStore>,
        snapshot_store: Arc<dyn SnapshotStore>,
        feeds: Arc<FeedStore>,
    ) -> Self {
        let subscriptions = Arc::new(DataServiceSubscriptions::new());
        let manager = Arc::new(DataSpaceManager::new(
            signing.clone(),
            metadata_store,
            SnapshotManager::new(snapshot_store),
            feeds.clone(),
            subscriptions.clone(),
            Arc::new(ModelRegistry::new()),
            config.clone(),
            Context::new("space-manager"),
        ));
        Self {
            config,
            signing,
            feeds,
            subscriptions,
            manager,
        }
    }

    /// In-memory stores and fresh identity and device keys.
    pub fn in_memory(config: ServicesConfig) -> Self {
        Self::in_memory_with_feeds(config, Arc::new(FeedStore::new()))
    }

    /// In-memory stores over a shared feed store.
    ///
    /// Services sharing a feed store see each other's feeds as if replicated.
    pub fn in_memory_with_feeds(config: ServicesConfig, feeds: Arc<FeedStore>) -> Self {
        let keyring = Arc::new(MemoryKeyring::new());
        let identity_key = keyring.import(Keypair::generate());
        let device_key = keyring.import(Keypair::generate());
        Self::new(
            config,
            SigningContext::new(keyring, identity_key, device_key),
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemorySnapshotStore::new()),
            feeds,
        )
    }

    /// SQLite-backed metadata and snapshots.
    pub fn sqlite(
        config: ServicesConfig,
        signing: SigningContext,
        path: impl AsRef<Path>,
        feeds: Arc<FeedStore>,
    ) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(path)?);
        Ok(Self::new(config, signing, store.clone(), store, feeds))
    }

    /// Open every recorded space, within the configured deadline.
    ///
    /// On timeout the attempt is abandoned; persisted metadata is not
    /// modified by opening.
    pub async fn open(&self) -> Result<()> {
        with_timeout(
            self.config.init_timeout(),
            "space services init",
            self.manager.open(),
        )
        .await
        .map_err(|e| SpaceError::Timeout(e.to_string()))??;
        info!(spaces = self.manager.spaces().len(), "space services open");
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.manager.close().await
    }

    pub fn config(&self) -> &ServicesConfig {
        &self.config
    }

    pub fn signing(&self) -> &SigningContext {
        &self.signing
    }

    pub fn feeds(&self) -> &Arc<FeedStore> {
        &self.feeds
    }

    pub fn manager(&self) -> &Arc<DataSpaceManager> {
        &self.manager
    }

    pub fn subscriptions(&self) -> &Arc<DataServiceSubscriptions> {
        &self.subscriptions
    }

    /// Data service over this device's spaces.
    pub fn data_service(&self) -> Arc<dyn DataService> {
        Arc::new(LocalDataService::new(self.subscriptions.clone()))
    }
}
