//! DataSpaceManager: creates, accepts, opens and closes spaces.
//!
//! `open`, `close`, `create_space` and `accept_space` run one at a time
//! under the manager's lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use spacegate_async::{Context, Lock};
use spacegate_core::{PublicKey, Timeframe};
use spacegate_database::{DataServiceSubscriptions, ModelRegistry};
use spacegate_store::{FeedStore, MetadataStore, SpaceMetadata};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ServicesConfig;
use crate::data_space::{DataSpace, DataSpaceParams};
use crate::error::{Result, SpaceError};
use crate::signing::SigningContext;
use crate::snapshot::SnapshotManager;

const UPDATED_CHANNEL_CAPACITY: usize = 64;

/// Options for joining a space created elsewhere.
///
/// The control and data feed keys belong to this device and must already
/// be admitted, or about to be, by a member of the space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptSpaceOptions {
    pub space_key: PublicKey,
    /// Feed holding the space's genesis credential.
    pub genesis_feed_key: PublicKey,
    pub control_feed_key: PublicKey,
    pub data_feed_key: PublicKey,
}

/// Owns every space on this device.
pub struct DataSpaceManager {
    lock: Lock,
    signing: SigningContext,
    metadata_store: Arc<dyn MetadataStore>,
    snapshot_manager: SnapshotManager,
    feeds: Arc<FeedStore>,
    subscriptions: Arc<DataServiceSubscriptions>,
    models: Arc<ModelRegistry>,
    config: ServicesConfig,
    spaces: RwLock<HashMap<PublicKey, Arc<DataSpace>>>,
    updated: broadcast::Sender<PublicKey>,
    ctx: Context,
}

impl DataSpaceManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signing: SigningContext,
        metadata_store: Arc<dyn MetadataStore>,
        snapshot_manager: SnapshotManager,
        feeds: Arc<FeedStore>,
        subscriptions: Arc<DataServiceSubscriptions>,
        models: Arc<ModelRegistry>,
        config: ServicesConfig,
        ctx: Context,
    ) -> Self {
        let (updated, _) = broadcast::channel(UPDATED_CHANNEL_CAPACITY);
        let lock = match config.lock_warn_after() {
            Some(threshold) => Lock::with_diagnostics(threshold),
            None => Lock::new(),
        };
        Self {
            lock,
            signing,
            metadata_store,
            snapshot_manager,
            feeds,
            subscriptions,
            models,
            config,
            spaces: RwLock::new(HashMap::new()),
            updated,
            ctx,
        }
    }

    /// Keys of spaces created or accepted, as they happen.
    pub fn subscribe_updated(&self) -> broadcast::Receiver<PublicKey> {
        self.updated.subscribe()
    }

    pub fn spaces(&self) -> Vec<Arc<DataSpace>> {
        self.spaces
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, key: &PublicKey) -> Option<Arc<DataSpace>> {
        self.spaces
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Open every recorded space.
    ///
    /// Each space with a saved timeframe is ready only after its data has
    /// been replayed up to it.
    pub async fn open(&self) -> Result<()> {
        let _guard = self.lock.acquire(Some("open")).await;
        self.ctx.check()?;

        self.metadata_store.load().await?;
        let recorded = self.metadata_store.spaces().await?;
        debug!(spaces = recorded.len(), "opening spaces");

        for metadata in recorded {
            if self.get(&metadata.key).is_some() {
                continue;
            }
            let space = self.construct_space(metadata).await?;
            let started = async {
                self.ctx.run(space.open()).await??;
                Ok::<_, SpaceError>(())
            }
            .await;
            if let Err(e) = started {
                self.discard(&space).await;
                return Err(e);
            }
            self.register(space);
        }
        Ok(())
    }

    /// Close every space and refuse further work.
    pub async fn close(&self) -> Result<()> {
        // Dispose first so a pending `open` stops waiting and frees the lock.
        self.ctx.dispose();
        let _guard = self.lock.acquire(Some("close")).await;

        let spaces: Vec<_> = self
            .spaces
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, space)| space)
            .collect();
        for space in spaces {
            self.subscriptions.unregister_space(space.key());
            if let Err(e) = space.close().await {
                warn!(space_key = %space.key(), error = %e, "error closing space");
            }
        }
        debug!("space manager closed");
        Ok(())
    }

    /// Found a new space with this device as its admin.
    pub async fn create_space(&self) -> Result<Arc<DataSpace>> {
        let _guard = self.lock.acquire(Some("create_space")).await;
        self.ctx.check()?;

        let keyring = self.signing.keyring();
        let space_key = keyring.create_key().await?;
        let control_feed_key = keyring.create_key().await?;
        let data_feed_key = keyring.create_key().await?;
        let metadata = SpaceMetadata::new(space_key, control_feed_key, data_feed_key);

        let space = self.construct_space(metadata.clone()).await?;
        let started = async {
            self.ctx.run(space.open()).await??;
            self.write_genesis(&space).await?;
            self.metadata_store.add_space(metadata).await?;
            Ok::<_, SpaceError>(())
        }
        .await;
        if let Err(e) = started {
            self.discard(&space).await;
            return Err(e);
        }

        self.register(space.clone());
        info!(space_key = %space_key, "created space");
        let _ = self.updated.send(space_key);
        Ok(space)
    }

    /// Join a space whose genesis already exists on `genesis_feed_key`.
    ///
    /// Writes nothing; the space becomes writable once its feed admissions
    /// arrive over the control feeds.
    pub async fn accept_space(&self, opts: AcceptSpaceOptions) -> Result<Arc<DataSpace>> {
        let _guard = self.lock.acquire(Some("accept_space")).await;
        self.ctx.check()?;

        if self.get(&opts.space_key).is_some() {
            return Err(SpaceError::SpaceExists(opts.space_key));
        }

        let metadata = SpaceMetadata {
            key: opts.space_key,
            genesis_feed_key: opts.genesis_feed_key,
            control_feed_key: opts.control_feed_key,
            data_feed_key: opts.data_feed_key,
            latest_timeframe: None,
            snapshot_ref: None,
        };

        let space = self.construct_space(metadata.clone()).await?;
        let started = async {
            self.ctx.run(space.open()).await??;
            self.metadata_store.add_space(metadata).await?;
            Ok::<_, SpaceError>(())
        }
        .await;
        if let Err(e) = started {
            self.discard(&space).await;
            return Err(e);
        }

        self.register(space.clone());
        info!(space_key = %opts.space_key, "accepted space");
        let _ = self.updated.send(opts.space_key);
        Ok(space)
    }

    /// Write the founding credential chain and wait until it is processed.
    async fn write_genesis(&self, space: &DataSpace) -> Result<()> {
        let metadata = space.metadata();
        let chain = self
            .signing
            .generator()
            .create_space_genesis(metadata.key, metadata.control_feed_key, metadata.data_feed_key)
            .await?;

        let mut written = 0;
        for credential in &chain {
            written = space.space().write_credential(credential)?;
        }
        let target: Timeframe = [(metadata.control_feed_key, written)].into_iter().collect();
        self.ctx
            .run(space.space().wait_until_control_timeframe(&target))
            .await??;
        Ok(())
    }

    async fn discard(&self, space: &DataSpace) {
        if let Err(e) = space.close().await {
            warn!(space_key = %space.key(), error = %e, "error closing space");
        }
    }

    async fn construct_space(&self, metadata: SpaceMetadata) -> Result<Arc<DataSpace>> {
        let snapshot = match &metadata.snapshot_ref {
            Some(id) => {
                let snapshot = self.snapshot_manager.load(id).await?;
                if snapshot.is_none() {
                    warn!(space_key = %metadata.key, snapshot = %id, "recorded snapshot missing");
                }
                snapshot
            }
            None => None,
        };

        let ctx = self.ctx.derive(format!("space-{}", metadata.key.truncate()));
        Ok(Arc::new(DataSpace::new(
            DataSpaceParams {
                metadata,
                local_peer_id: self.signing.device_key,
                feeds: self.feeds.clone(),
                metadata_store: self.metadata_store.clone(),
                snapshot_manager: self.snapshot_manager.clone(),
                models: self.models.clone(),
                presence: self.config.presence.clone(),
                data_channel_capacity: self.config.data_channel_capacity,
                lock_warn_after: self.config.lock_warn_after(),
                snapshot,
            },
            ctx,
        )))
    }

    /// Make an open space visible to lookups and data service clients.
    fn register(&self, space: Arc<DataSpace>) {
        match space.create_data_service_host() {
            Ok(host) => self
                .subscriptions
                .register_space(*space.key(), Arc::new(host)),
            Err(e) => warn!(space_key = %space.key(), error = %e, "no data service host"),
        }
        self.spaces
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(*space.key(), space);
    }
}
