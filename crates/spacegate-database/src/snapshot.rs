//! Point-in-time copies of the object index.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spacegate_core::Timeframe;

use crate::error::{DatabaseError, Result};
use crate::item::{Item, ItemId};

/// One item as captured in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub model_type: String,
    pub parent: Option<ItemId>,
    pub props: BTreeMap<String, Value>,
}

impl From<Item> for ItemSnapshot {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            model_type: item.model_type,
            parent: item.parent,
            props: item.props,
        }
    }
}

impl From<ItemSnapshot> for Item {
    fn from(snapshot: ItemSnapshot) -> Self {
        Self {
            id: snapshot.id,
            model_type: snapshot.model_type,
            parent: snapshot.parent,
            props: snapshot.props,
        }
    }
}

/// The object index plus the data timeframe it reflects.
///
/// Items are ordered parents before children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub timeframe: Timeframe,
    pub items: Vec<ItemSnapshot>,
}

impl DatabaseSnapshot {
    /// Encode for a snapshot store.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| DatabaseError::Encoding(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| DatabaseError::Decoding(e.to_string()))
    }
}
