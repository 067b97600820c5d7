//! In-process append-only feeds.
//!
//! Each feed is an ordered list of blocks keyed by the feed's public key.
//! Sequence numbers are 1-based. Readers wait for new blocks and end when
//! the feed is closed. Replication between peers happens outside this crate;
//! a replicated feed looks the same to readers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use spacegate_core::PublicKey;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Length and open state of a feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedHead {
    pub length: u64,
    pub closed: bool,
}

/// A handle to one feed. Cloning shares the feed.
#[derive(Clone)]
pub struct Feed {
    key: PublicKey,
    inner: Arc<FeedInner>,
}

struct FeedInner {
    blocks: RwLock<Vec<Bytes>>,
    head: watch::Sender<FeedHead>,
}

impl Feed {
    fn new(key: PublicKey) -> Self {
        let (head, _) = watch::channel(FeedHead::default());
        Self {
            key,
            inner: Arc::new(FeedInner {
                blocks: RwLock::new(Vec::new()),
                head,
            }),
        }
    }

    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    /// Number of blocks.
    pub fn length(&self) -> u64 {
        self.inner.head.borrow().length
    }

    pub fn is_closed(&self) -> bool {
        self.inner.head.borrow().closed
    }

    /// Append a block. Returns its sequence number.
    pub fn append(&self, data: Bytes) -> Result<u64> {
        let seq = {
            let mut blocks = self.inner.blocks.write().unwrap_or_else(|e| e.into_inner());
            if self.is_closed() {
                return Err(StoreError::FeedClosed(self.key.to_hex()));
            }
            blocks.push(data);
            blocks.len() as u64
        };
        self.inner.head.send_modify(|head| head.length = seq);
        Ok(seq)
    }

    /// Block at a 1-based sequence number.
    pub fn get(&self, seq: u64) -> Option<Bytes> {
        let index = usize::try_from(seq.checked_sub(1)?).ok()?;
        self.inner
            .blocks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(index)
            .cloned()
    }

    /// Stop accepting appends and end all readers once drained. Idempotent.
    pub fn close(&self) {
        self.inner.head.send_modify(|head| head.closed = true);
    }

    /// Read blocks starting at `from_seq` (1 reads from the beginning).
    pub fn reader(&self, from_seq: u64) -> FeedReader {
        FeedReader {
            feed: self.clone(),
            next: from_seq.max(1),
            head: self.inner.head.subscribe(),
        }
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("key", &self.key)
            .field("length", &self.length())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Sequential reader over a feed.
pub struct FeedReader {
    feed: Feed,
    next: u64,
    head: watch::Receiver<FeedHead>,
}

impl FeedReader {
    pub fn feed_key(&self) -> &PublicKey {
        self.feed.key()
    }

    /// Next sequence number this reader will return.
    pub fn position(&self) -> u64 {
        self.next
    }

    /// Wait for the next block. `None` once the feed is closed and drained.
    pub async fn next(&mut self) -> Option<(u64, Bytes)> {
        loop {
            let head = *self.head.borrow_and_update();
            if self.next <= head.length {
                let seq = self.next;
                let block = self.feed.get(seq)?;
                self.next += 1;
                return Some((seq, block));
            }
            if head.closed {
                return None;
            }
            self.head.changed().await.ok()?;
        }
    }
}

/// Registry of feeds on this device.
#[derive(Default)]
pub struct FeedStore {
    feeds: RwLock<HashMap<PublicKey, Feed>>,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a feed, creating it if absent.
    pub fn open_feed(&self, key: PublicKey) -> Feed {
        let mut feeds = self.feeds.write().unwrap_or_else(|e| e.into_inner());
        feeds
            .entry(key)
            .or_insert_with(|| {
                debug!(feed_key = %key, "opened feed");
                Feed::new(key)
            })
            .clone()
    }

    pub fn get(&self, key: &PublicKey) -> Option<Feed> {
        self.feeds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn keys(&self) -> Vec<PublicKey> {
        self.feeds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    /// Close every feed.
    pub fn close(&self) {
        for feed in self.feeds.read().unwrap_or_else(|e| e.into_inner()).values() {
            feed.close();
        }
    }
}

impl std::fmt::Debug for FeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedStore")
            .field("feeds", &self.keys().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(b: u8) -> PublicKey {
        PublicKey::from_bytes([b; 32])
    }

    #[test]
    fn test_append_assigns_one_based_seq() {
        let store = FeedStore::new();
        let feed = store.open_feed(key(1));
        assert_eq!(feed.append(Bytes::from_static(b"a")).unwrap(), 1);
        assert_eq!(feed.append(Bytes::from_static(b"b")).unwrap(), 2);
        assert_eq!(feed.get(0), None);
        assert_eq!(feed.get(2), Some(Bytes::from_static(b"b")));

        // Same handle from the registry.
        assert_eq!(store.open_feed(key(1)).length(), 2);
    }

    #[test]
    fn test_closed_feed_refuses_append() {
        let feed = FeedStore::new().open_feed(key(1));
        feed.close();
        assert!(matches!(
            feed.append(Bytes::new()),
            Err(StoreError::FeedClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_reader_waits_for_blocks() {
        let feed = FeedStore::new().open_feed(key(1));
        feed.append(Bytes::from_static(b"first")).unwrap();

        let mut reader = feed.reader(1);
        assert_eq!(reader.next().await, Some((1, Bytes::from_static(b"first"))));

        let writer = feed.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.append(Bytes::from_static(b"second")).unwrap();
            writer.close();
        });

        assert_eq!(reader.next().await, Some((2, Bytes::from_static(b"second"))));
        assert_eq!(reader.next().await, None);
    }

    #[tokio::test]
    async fn test_reader_from_offset() {
        let feed = FeedStore::new().open_feed(key(1));
        for i in 0..5u8 {
            feed.append(Bytes::from(vec![i])).unwrap();
        }
        feed.close();

        let mut reader = feed.reader(4);
        assert_eq!(reader.next().await.map(|(seq, _)| seq), Some(4));
        assert_eq!(reader.next().await.map(|(seq, _)| seq), Some(5));
        assert_eq!(reader.next().await, None);
    }
}
