//! Object mutations and their feed encoding.
//!
//! Each block on a data feed is one CBOR-encoded [`EchoEnvelope`].

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spacegate_core::PublicKey;

use crate::error::{DatabaseError, Result};
use crate::item::ItemId;

/// A change to one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemMutation {
    /// Create the item.
    Genesis {
        model_type: String,
        parent: Option<ItemId>,
        props: BTreeMap<String, Value>,
    },

    /// Set one property.
    Set { key: String, value: Value },

    /// Remove one property.
    Unset { key: String },

    /// Delete the item.
    Delete,
}

/// A mutation addressed to an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoEnvelope {
    pub item_id: ItemId,
    pub mutation: ItemMutation,
}

impl EchoEnvelope {
    pub fn new(item_id: ItemId, mutation: ItemMutation) -> Self {
        Self { item_id, mutation }
    }

    /// Encode as a feed block.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| DatabaseError::Encoding(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    /// Decode a feed block.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| DatabaseError::Decoding(e.to_string()))
    }
}

/// An envelope together with its position on a data feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    pub feed_key: PublicKey,
    pub seq: u64,
    pub envelope: EchoEnvelope,
}
