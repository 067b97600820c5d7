//! Database backends.
//!
//! A backend connects an object index to its source of mutations.
//!
//! - [`FeedDatabaseBackend`] consumes mutations read from the space's data
//!   feeds and writes local mutations to the device's own data feed.
//! - [`RemoteDatabaseBackend`] has no local feeds; it forwards writes to a
//!   [`DataService`] and mirrors the remote index.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use spacegate_core::{PublicKey, Timeframe};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::demuxer::ItemDemuxer;
use crate::error::{DatabaseError, Result};
use crate::item::ItemManager;
use crate::mirror::DataMirror;
use crate::model::ModelRegistry;
use crate::mutation::{EchoEnvelope, FeedMessage};
use crate::service::{DataService, DataServiceHost};
use crate::snapshot::DatabaseSnapshot;
use crate::writer::{FeedWriter, WriteReceipt};

/// Source and sink of an object index.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Start filling `items`. Fails if already open.
    async fn open(&self, items: Arc<ItemManager>, models: Arc<ModelRegistry>) -> Result<()>;

    /// Stop applying mutations. Idempotent.
    async fn close(&self) -> Result<()>;

    /// True if local writes have nowhere to go.
    fn is_read_only(&self) -> bool;

    /// Sink for local mutations, if any.
    fn write_stream(&self) -> Option<Arc<dyn FeedWriter>>;

    async fn create_snapshot(&self) -> Result<DatabaseSnapshot>;

    fn create_data_service_host(&self) -> Result<DataServiceHost>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Feed-backed
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FeedBackendState {
    inbound: Option<mpsc::Receiver<FeedMessage>>,
    demuxer: Option<Arc<ItemDemuxer>>,
    pipe: Option<JoinHandle<()>>,
}

/// Backend fed by data feed messages.
pub struct FeedDatabaseBackend {
    state: Mutex<FeedBackendState>,
    outbound: Option<Arc<dyn FeedWriter>>,
    initial_snapshot: Option<DatabaseSnapshot>,
    timeframe: Arc<watch::Sender<Timeframe>>,
}

impl FeedDatabaseBackend {
    /// `inbound` carries decoded messages from every admitted data feed.
    /// `outbound` is absent for a read-only replica. `snapshot` is restored
    /// on open, before any inbound message is applied.
    pub fn new(
        inbound: mpsc::Receiver<FeedMessage>,
        outbound: Option<Arc<dyn FeedWriter>>,
        snapshot: Option<DatabaseSnapshot>,
    ) -> Self {
        let (timeframe, _) = watch::channel(Timeframe::new());
        Self {
            state: Mutex::new(FeedBackendState {
                inbound: Some(inbound),
                ..Default::default()
            }),
            outbound,
            initial_snapshot: snapshot,
            timeframe: Arc::new(timeframe),
        }
    }

    /// Data feed positions applied so far.
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe.borrow().clone()
    }

    pub fn subscribe_timeframe(&self) -> watch::Receiver<Timeframe> {
        self.timeframe.subscribe()
    }

    /// Resolve once the applied timeframe covers `target`.
    pub async fn wait_until(&self, target: &Timeframe) -> Result<()> {
        wait_for_timeframe(self.timeframe.subscribe(), target).await
    }

    fn demuxer(&self) -> Result<Arc<ItemDemuxer>> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .demuxer
            .clone()
            .ok_or(DatabaseError::NotOpen)
    }
}

/// Resolve once `rx` publishes a timeframe covering `target`.
pub(crate) async fn wait_for_timeframe(
    mut rx: watch::Receiver<Timeframe>,
    target: &Timeframe,
) -> Result<()> {
    rx.wait_for(|tf| tf.dominates(target))
        .await
        .map(|_| ())
        .map_err(|_| DatabaseError::TimeframeClosed)
}

#[async_trait]
impl DatabaseBackend for FeedDatabaseBackend {
    async fn open(&self, items: Arc<ItemManager>, models: Arc<ModelRegistry>) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.demuxer.is_some() {
            return Err(DatabaseError::AlreadyOpen);
        }
        let mut inbound = state.inbound.take().ok_or(DatabaseError::AlreadyOpen)?;

        let demuxer = Arc::new(ItemDemuxer::with_timeframe(
            items,
            models,
            self.timeframe.clone(),
        ));
        if let Some(snapshot) = &self.initial_snapshot {
            if let Err(e) = demuxer.restore_from_snapshot(snapshot) {
                state.inbound = Some(inbound);
                return Err(e);
            }
        }

        let pipe_demuxer = demuxer.clone();
        let pipe = tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                if let Err(e) = pipe_demuxer.apply(&message) {
                    warn!(
                        feed_key = %message.feed_key,
                        seq = message.seq,
                        error = %e,
                        "mutation not applied"
                    );
                }
            }
        });

        state.demuxer = Some(demuxer);
        state.pipe = Some(pipe);
        debug!(read_only = self.outbound.is_none(), "feed backend open");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let pipe = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pipe
            .take();
        if let Some(pipe) = pipe {
            pipe.abort();
            debug!("feed backend closed");
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.outbound.is_none()
    }

    fn write_stream(&self) -> Option<Arc<dyn FeedWriter>> {
        self.outbound.clone()
    }

    async fn create_snapshot(&self) -> Result<DatabaseSnapshot> {
        Ok(self.demuxer()?.create_snapshot())
    }

    fn create_data_service_host(&self) -> Result<DataServiceHost> {
        let demuxer = self.demuxer()?;
        Ok(DataServiceHost::new(
            demuxer.items().clone(),
            self.outbound.clone(),
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote
// ─────────────────────────────────────────────────────────────────────────────

/// Backend for a space whose feeds live elsewhere.
pub struct RemoteDatabaseBackend {
    service: Arc<dyn DataService>,
    space_key: PublicKey,
    mirror: tokio::sync::Mutex<Option<DataMirror>>,
}

impl RemoteDatabaseBackend {
    pub fn new(service: Arc<dyn DataService>, space_key: PublicKey) -> Self {
        Self {
            service,
            space_key,
            mirror: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl DatabaseBackend for RemoteDatabaseBackend {
    async fn open(&self, items: Arc<ItemManager>, _models: Arc<ModelRegistry>) -> Result<()> {
        let mut mirror = self.mirror.lock().await;
        if mirror.is_some() {
            return Err(DatabaseError::AlreadyOpen);
        }
        *mirror = Some(DataMirror::open(self.service.clone(), self.space_key, items).await?);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(mirror) = self.mirror.lock().await.take() {
            mirror.close();
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn write_stream(&self) -> Option<Arc<dyn FeedWriter>> {
        Some(Arc::new(RemoteWriter {
            service: self.service.clone(),
            space_key: self.space_key,
        }))
    }

    async fn create_snapshot(&self) -> Result<DatabaseSnapshot> {
        Err(DatabaseError::Unsupported("create_snapshot"))
    }

    fn create_data_service_host(&self) -> Result<DataServiceHost> {
        Err(DatabaseError::Unsupported("create_data_service_host"))
    }
}

struct RemoteWriter {
    service: Arc<dyn DataService>,
    space_key: PublicKey,
}

#[async_trait]
impl FeedWriter for RemoteWriter {
    async fn write(&self, envelope: &EchoEnvelope) -> Result<WriteReceipt> {
        let ack = self.service.write(&self.space_key, envelope.clone()).await?;
        let feed_key = ack
            .feed_key
            .ok_or_else(|| DatabaseError::InvalidAck("missing feed key".into()))?;
        let seq = ack
            .seq
            .ok_or_else(|| DatabaseError::InvalidAck("missing sequence number".into()))?;
        Ok(WriteReceipt { feed_key, seq })
    }
}
