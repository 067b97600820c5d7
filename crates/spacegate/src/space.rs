//! Space: the control pipeline of one space.
//!
//! Credentials are read from the genesis feed and from every feed admitted
//! with designation `Control`, and handed to the [`SpaceStateMachine`]
//! tagged with the feed they came from. Each feed is read in order; feeds
//! are read concurrently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use spacegate_async::Context;
use spacegate_core::{
    decode_credential, encode_credential, Assertion, Credential, FeedDesignation, PublicKey,
    Timeframe,
};
use spacegate_credentials::{CredentialProcessor, SpaceStateMachine};
use spacegate_store::{Feed, FeedStore};
use tokio::sync::watch;
use tracing::{debug, error};

use crate::error::{Result, SpaceError};

/// Reads control feeds into the state machine.
pub struct Space {
    inner: Arc<ControlPipeline>,
    tracker: Arc<dyn CredentialProcessor>,
}

struct ControlPipeline {
    key: PublicKey,
    genesis_feed_key: PublicKey,
    feeds: Arc<FeedStore>,
    control_feed: Feed,
    state: Arc<SpaceStateMachine>,
    timeframe: Arc<watch::Sender<Timeframe>>,
    piped: Mutex<HashSet<PublicKey>>,
    ctx: Context,
}

impl Space {
    pub fn new(
        state: Arc<SpaceStateMachine>,
        genesis_feed_key: PublicKey,
        control_feed_key: PublicKey,
        feeds: Arc<FeedStore>,
        ctx: Context,
    ) -> Self {
        let (timeframe, _) = watch::channel(Timeframe::new());
        let inner = Arc::new(ControlPipeline {
            key: *state.space_key(),
            genesis_feed_key,
            control_feed: feeds.open_feed(control_feed_key),
            feeds,
            state,
            timeframe: Arc::new(timeframe),
            piped: Mutex::new(HashSet::new()),
            ctx,
        });
        let tracker: Arc<dyn CredentialProcessor> = Arc::new(ControlFeedTracker {
            pipeline: Arc::downgrade(&inner),
        });
        Self { inner, tracker }
    }

    pub fn key(&self) -> &PublicKey {
        &self.inner.key
    }

    pub fn genesis_feed_key(&self) -> &PublicKey {
        &self.inner.genesis_feed_key
    }

    /// This device's control feed.
    pub fn control_feed_key(&self) -> &PublicKey {
        self.inner.control_feed.key()
    }

    pub fn state(&self) -> &Arc<SpaceStateMachine> {
        &self.inner.state
    }

    /// Start reading the genesis feed and track admitted control feeds.
    pub async fn open(&self) -> Result<()> {
        self.inner.ctx.check()?;
        self.inner.pipe_feed(self.inner.genesis_feed_key)?;
        self.inner
            .state
            .add_credential_processor(self.tracker.clone())
            .await?;
        debug!(space_key = %self.inner.key, "control pipeline open");
        Ok(())
    }

    /// Stop reading. Idempotent.
    pub async fn close(&self) {
        self.inner
            .state
            .remove_credential_processor(&self.tracker)
            .await;
        self.inner.ctx.dispose();
    }

    /// Append a credential to this device's control feed.
    pub fn write_credential(&self, credential: &Credential) -> Result<u64> {
        Ok(self
            .inner
            .control_feed
            .append(encode_credential(credential).into())?)
    }

    /// Control feed positions processed so far.
    pub fn control_timeframe(&self) -> Timeframe {
        self.inner.timeframe.borrow().clone()
    }

    /// Resolve once the control pipeline has processed `target`.
    pub async fn wait_until_control_timeframe(&self, target: &Timeframe) -> Result<()> {
        let mut rx = self.inner.timeframe.subscribe();
        self.inner
            .ctx
            .run(async move {
                rx.wait_for(|tf| tf.dominates(target))
                    .await
                    .map(|_| ())
                    .map_err(|_| SpaceError::TimeframeClosed)
            })
            .await?
    }
}

impl ControlPipeline {
    /// Start a reader for `feed_key` unless one is running.
    fn pipe_feed(&self, feed_key: PublicKey) -> Result<()> {
        let first = self
            .piped
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(feed_key);
        if !first {
            return Ok(());
        }

        let mut reader = self.feeds.open_feed(feed_key).reader(1);
        let state = self.state.clone();
        let timeframe = self.timeframe.clone();
        let space_key = self.key;
        self.ctx.spawn("control-feed", async move {
            while let Some((seq, block)) = reader.next().await {
                match decode_credential(&block) {
                    Ok(credential) => {
                        state.process(&credential, feed_key).await;
                    }
                    Err(e) => {
                        error!(space_key = %space_key, feed_key = %feed_key, seq, error = %e, "undecodable control block");
                    }
                }
                timeframe.send_modify(|tf| {
                    tf.set(feed_key, seq);
                });
            }
        })?;
        debug!(space_key = %self.key, feed_key = %feed_key, "piping control feed");
        Ok(())
    }
}

/// Starts a control feed reader for each admitted control feed.
struct ControlFeedTracker {
    pipeline: std::sync::Weak<ControlPipeline>,
}

#[async_trait]
impl CredentialProcessor for ControlFeedTracker {
    async fn process_credential(&self, credential: &Credential) -> anyhow::Result<()> {
        let Assertion::AdmittedFeed {
            space_key,
            designation: FeedDesignation::Control,
            ..
        } = &credential.assertion
        else {
            return Ok(());
        };
        let Some(pipeline) = self.pipeline.upgrade() else {
            return Ok(());
        };
        if *space_key == pipeline.key {
            pipeline.pipe_feed(credential.subject.id)?;
        }
        Ok(())
    }
}
