//! Timeframe: a vector of per-feed sequence positions.
//!
//! A timeframe records, for each feed, the highest sequence number that has
//! been processed. It is the replay checkpoint persisted in space metadata
//! and the gate a data pipeline waits on before a space is reported ready.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crypto::PublicKey;

/// Ordered map of feed key to highest processed sequence number.
///
/// Sequence numbers are 1-based; an absent feed means nothing processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeframe(BTreeMap<PublicKey, u64>);

impl Timeframe {
    /// Create an empty timeframe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest processed sequence for a feed.
    pub fn get(&self, feed_key: &PublicKey) -> Option<u64> {
        self.0.get(feed_key).copied()
    }

    /// Advance a feed's position. Never moves backwards.
    ///
    /// Returns true if the position changed.
    pub fn set(&mut self, feed_key: PublicKey, seq: u64) -> bool {
        let entry = self.0.entry(feed_key).or_insert(0);
        if seq > *entry {
            *entry = seq;
            true
        } else {
            false
        }
    }

    /// Take the per-feed maximum of both timeframes.
    pub fn merge(&mut self, other: &Timeframe) {
        for (key, seq) in other.iter() {
            self.set(*key, seq);
        }
    }

    /// Check whether every position in `other` has been reached.
    pub fn dominates(&self, other: &Timeframe) -> bool {
        other
            .iter()
            .all(|(key, seq)| self.get(key).map_or(false, |own| own >= seq))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over (feed, seq) in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PublicKey, u64)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }
}

impl FromIterator<(PublicKey, u64)> for Timeframe {
    fn from_iter<I: IntoIterator<Item = (PublicKey, u64)>>(iter: I) -> Self {
        let mut timeframe = Timeframe::new();
        for (key, seq) in iter {
            timeframe.set(key, seq);
        }
        timeframe
    }
}
