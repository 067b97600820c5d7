//! DataSpace: one space with its control pipeline, database and presence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use spacegate_async::{Context, Lock};
use spacegate_core::{PublicKey, Timeframe};
use spacegate_credentials::{CredentialProcessor, SpaceStateMachine};
use spacegate_database::{
    DataServiceHost, Database, DatabaseBackend, DatabaseSnapshot, FeedDatabaseBackend,
    FeedStoreWriter, FeedWriter, ModelRegistry,
};
use spacegate_store::{FeedStore, MetadataStore, SpaceMetadata};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::PresenceConfig;
use crate::data_pipeline::DataPipeline;
use crate::error::Result;
use crate::network::{NetworkSession, SessionExtension, OBJECT_SYNC_EXTENSION, PRESENCE_EXTENSION};
use crate::presence::Presence;
use crate::snapshot::SnapshotManager;
use crate::space::Space;

/// Lifecycle state of a [`DataSpace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSpaceState {
    Closed,
    Ready,
}

/// Everything needed to assemble a [`DataSpace`].
pub struct DataSpaceParams {
    pub metadata: SpaceMetadata,
    pub local_peer_id: PublicKey,
    pub feeds: Arc<FeedStore>,
    pub metadata_store: Arc<dyn MetadataStore>,
    pub snapshot_manager: SnapshotManager,
    pub models: Arc<ModelRegistry>,
    pub presence: PresenceConfig,
    pub data_channel_capacity: usize,
    pub lock_warn_after: Option<Duration>,
    /// Restored before live data is applied.
    pub snapshot: Option<DatabaseSnapshot>,
}

/// A space this device participates in.
pub struct DataSpace {
    key: PublicKey,
    metadata: SpaceMetadata,
    space: Space,
    backend: Arc<FeedDatabaseBackend>,
    database: Database,
    pipeline: Arc<DataPipeline>,
    presence: Arc<Presence>,
    snapshot_manager: SnapshotManager,
    metadata_store: Arc<dyn MetadataStore>,
    state: Mutex<DataSpaceState>,
    ctx: Context,
}

impl DataSpace {
    /// Wire the space. Nothing runs until [`DataSpace::open`].
    pub fn new(params: DataSpaceParams, ctx: Context) -> Self {
        let key = params.metadata.key;
        let lock = match params.lock_warn_after {
            Some(threshold) => Lock::with_diagnostics(threshold),
            None => Lock::new(),
        };
        let state = Arc::new(SpaceStateMachine::new(key).with_lock(lock));

        let space = Space::new(
            state,
            params.metadata.genesis_feed_key,
            params.metadata.control_feed_key,
            params.feeds.clone(),
            ctx.derive("control"),
        );

        let start_from = params
            .snapshot
            .as_ref()
            .map(|s| s.timeframe.clone())
            .unwrap_or_default();
        let (inbound, rx) = mpsc::channel(params.data_channel_capacity);
        let writer: Arc<dyn FeedWriter> = Arc::new(FeedStoreWriter::new(
            params.feeds.open_feed(params.metadata.data_feed_key),
        ));
        let backend = Arc::new(FeedDatabaseBackend::new(rx, Some(writer), params.snapshot));
        let database = Database::new(backend.clone(), params.models);

        let pipeline = Arc::new(DataPipeline::new(
            key,
            params.feeds,
            inbound,
            backend.clone(),
            start_from,
            ctx.derive("data"),
        ));

        let presence = Arc::new(Presence::new(
            params.local_peer_id,
            params.presence,
            ctx.derive("presence"),
        ));

        Self {
            key,
            metadata: params.metadata,
            space,
            backend,
            database,
            pipeline,
            presence,
            snapshot_manager: params.snapshot_manager,
            metadata_store: params.metadata_store,
            state: Mutex::new(DataSpaceState::Closed),
            ctx,
        }
    }

    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    /// Metadata the space was opened with.
    pub fn metadata(&self) -> &SpaceMetadata {
        &self.metadata
    }

    pub fn state(&self) -> DataSpaceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn presence(&self) -> &Arc<Presence> {
        &self.presence
    }

    pub fn snapshot_manager(&self) -> &SnapshotManager {
        &self.snapshot_manager
    }

    pub fn data_pipeline(&self) -> &Arc<DataPipeline> {
        &self.pipeline
    }

    fn pipeline_processor(&self) -> Arc<dyn CredentialProcessor> {
        self.pipeline.clone()
    }

    /// Start the pipelines.
    ///
    /// If the metadata records a `latest_timeframe`, returns only once the
    /// data pipeline has applied it.
    pub async fn open(&self) -> Result<()> {
        self.ctx.check()?;

        self.database.open().await?;
        self.space
            .state()
            .add_credential_processor(self.pipeline_processor())
            .await?;
        self.space.open().await?;
        self.presence.open()?;

        if let Some(timeframe) = &self.metadata.latest_timeframe {
            debug!(space_key = %self.key, "waiting for data pipeline to reach saved timeframe");
            self.pipeline.wait_until_timeframe(timeframe).await?;
        }

        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = DataSpaceState::Ready;
        info!(space_key = %self.key, "space ready");
        Ok(())
    }

    /// Stop everything. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.space
            .state()
            .remove_credential_processor(&self.pipeline_processor())
            .await;
        self.space.close().await;
        self.pipeline.close();
        self.presence.close();
        self.database.close().await?;
        self.ctx.dispose();
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = DataSpaceState::Closed;
        debug!(space_key = %self.key, "space closed");
        Ok(())
    }

    /// Snapshot the database and record it as the space's latest snapshot.
    pub async fn create_snapshot(&self) -> Result<String> {
        let snapshot = self.backend.create_snapshot().await?;
        let id = self.snapshot_manager.save(&snapshot).await?;
        self.metadata_store
            .set_snapshot_ref(&self.key, id.clone())
            .await?;
        Ok(id)
    }

    /// Record the data pipeline position to gate the next open.
    pub async fn save_timeframe(&self) -> Result<Timeframe> {
        let timeframe = self.pipeline.current_timeframe();
        self.metadata_store
            .set_latest_timeframe(&self.key, timeframe.clone())
            .await?;
        Ok(timeframe)
    }

    pub fn create_data_service_host(&self) -> Result<DataServiceHost> {
        Ok(self.backend.create_data_service_host()?)
    }

    /// Attach this space's protocol extensions to a new peer session.
    pub fn on_session(&self, session: &dyn NetworkSession) {
        let peer = session.remote_peer_id();
        session.add_extension(
            PRESENCE_EXTENSION,
            SessionExtension::Presence(self.presence.create_extension(peer)),
        );
        session.add_extension(
            OBJECT_SYNC_EXTENSION,
            SessionExtension::ObjectSync(self.snapshot_manager.object_sync().create_extension(peer)),
        );
        debug!(space_key = %self.key, peer_id = %peer, "session extensions attached");
    }
}

impl std::fmt::Debug for DataSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSpace")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}
