//! Data pipeline: pipes admitted data feeds into the database backend.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use spacegate_async::Context;
use spacegate_core::{Assertion, Credential, FeedDesignation, PublicKey, Timeframe};
use spacegate_credentials::CredentialProcessor;
use spacegate_database::{EchoEnvelope, FeedDatabaseBackend, FeedMessage};
use spacegate_store::FeedStore;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::Result;

/// Credential processor that starts a reader for each admitted data feed.
///
/// Readers start after the position recorded in `start_from`, so feeds
/// covered by a restored snapshot are not re-read from the beginning.
pub struct DataPipeline {
    space_key: PublicKey,
    feeds: Arc<FeedStore>,
    inbound: mpsc::Sender<FeedMessage>,
    backend: Arc<FeedDatabaseBackend>,
    start_from: Timeframe,
    piped: Mutex<HashSet<PublicKey>>,
    ctx: Context,
}

impl DataPipeline {
    pub fn new(
        space_key: PublicKey,
        feeds: Arc<FeedStore>,
        inbound: mpsc::Sender<FeedMessage>,
        backend: Arc<FeedDatabaseBackend>,
        start_from: Timeframe,
        ctx: Context,
    ) -> Self {
        Self {
            space_key,
            feeds,
            inbound,
            backend,
            start_from,
            piped: Mutex::new(HashSet::new()),
            ctx,
        }
    }

    /// Data feed positions applied to the database so far.
    pub fn current_timeframe(&self) -> Timeframe {
        self.backend.timeframe()
    }

    /// Resolve once the database has applied `target`.
    pub async fn wait_until_timeframe(&self, target: &Timeframe) -> Result<()> {
        self.ctx.run(self.backend.wait_until(target)).await??;
        Ok(())
    }

    /// Data feeds being read.
    pub fn feeds(&self) -> Vec<PublicKey> {
        let mut feeds: Vec<_> = self
            .piped
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect();
        feeds.sort();
        feeds
    }

    pub fn close(&self) {
        self.ctx.dispose();
    }

    fn pipe_feed(&self, feed_key: PublicKey) -> Result<()> {
        let first = self
            .piped
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(feed_key);
        if !first {
            return Ok(());
        }

        let from_seq = self.start_from.get(&feed_key).unwrap_or(0) + 1;
        let mut reader = self.feeds.open_feed(feed_key).reader(from_seq);
        let inbound = self.inbound.clone();
        let space_key = self.space_key;
        self.ctx.spawn("data-feed", async move {
            while let Some((seq, block)) = reader.next().await {
                let envelope = match EchoEnvelope::from_bytes(&block) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        error!(space_key = %space_key, feed_key = %feed_key, seq, error = %e, "undecodable data block");
                        continue;
                    }
                };
                let message = FeedMessage {
                    feed_key,
                    seq,
                    envelope,
                };
                if inbound.send(message).await.is_err() {
                    break;
                }
            }
        })?;
        debug!(space_key = %self.space_key, feed_key = %feed_key, from_seq, "piping data feed");
        Ok(())
    }
}

#[async_trait]
impl CredentialProcessor for DataPipeline {
    async fn process_credential(&self, credential: &Credential) -> anyhow::Result<()> {
        if let Assertion::AdmittedFeed {
            space_key,
            designation: FeedDesignation::Data,
            ..
        } = &credential.assertion
        {
            if *space_key == self.space_key {
                self.pipe_feed(credential.subject.id)?;
            }
        }
        Ok(())
    }
}
