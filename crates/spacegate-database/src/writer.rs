//! Outbound mutation streams.

use async_trait::async_trait;
use spacegate_core::PublicKey;
use spacegate_store::Feed;
use tracing::trace;

use crate::error::Result;
use crate::mutation::EchoEnvelope;

/// Where a written mutation landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub feed_key: PublicKey,
    pub seq: u64,
}

/// Sink for locally authored mutations.
#[async_trait]
pub trait FeedWriter: Send + Sync {
    async fn write(&self, envelope: &EchoEnvelope) -> Result<WriteReceipt>;
}

/// Appends encoded envelopes to a local data feed.
pub struct FeedStoreWriter {
    feed: Feed,
}

impl FeedStoreWriter {
    pub fn new(feed: Feed) -> Self {
        Self { feed }
    }

    pub fn feed_key(&self) -> &PublicKey {
        self.feed.key()
    }
}

#[async_trait]
impl FeedWriter for FeedStoreWriter {
    async fn write(&self, envelope: &EchoEnvelope) -> Result<WriteReceipt> {
        let seq = self.feed.append(envelope.to_bytes()?)?;
        trace!(feed_key = %self.feed.key(), seq, item_id = %envelope.item_id, "wrote mutation");
        Ok(WriteReceipt {
            feed_key: *self.feed.key(),
            seq,
        })
    }
}
