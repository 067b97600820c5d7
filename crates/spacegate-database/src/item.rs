//! Object index: items keyed by id.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tokio::sync::broadcast;

/// Capacity of the item update channel.
const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// A 32-byte random item identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub [u8; 32]);

impl ItemId {
    /// Generate a fresh id.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A live object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,

    /// Registered model type name.
    pub model_type: String,

    pub parent: Option<ItemId>,

    pub props: BTreeMap<String, Value>,
}

/// What happened to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemUpdateKind {
    Created,
    Updated,
    Deleted,
}

/// Change notification. `item` is the new state, absent after deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdate {
    pub item_id: ItemId,
    pub kind: ItemUpdateKind,
    pub item: Option<Item>,
}

/// In-memory object index.
///
/// Mutations come from the demuxer or a mirror; this type does not check
/// model types or parent links.
pub struct ItemManager {
    items: RwLock<BTreeMap<ItemId, Item>>,
    updates: broadcast::Sender<ItemUpdate>,
}

impl Default for ItemManager {
    fn default() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            items: RwLock::new(BTreeMap::new()),
            updates,
        }
    }
}

impl ItemManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_item(&self, id: &ItemId) -> Option<Item> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// All items in id order.
    pub fn items(&self) -> Vec<Item> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ItemUpdate> {
        self.updates.subscribe()
    }

    fn notify(&self, item_id: ItemId, kind: ItemUpdateKind, item: Option<Item>) {
        let _ = self.updates.send(ItemUpdate {
            item_id,
            kind,
            item,
        });
    }

    /// Insert or replace an item.
    pub fn upsert(&self, item: Item) {
        let id = item.id;
        let previous = self
            .items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, item.clone());
        let kind = if previous.is_some() {
            ItemUpdateKind::Updated
        } else {
            ItemUpdateKind::Created
        };
        self.notify(id, kind, Some(item));
    }

    /// Change one item in place. Returns false if it does not exist.
    pub fn update<F>(&self, id: &ItemId, f: F) -> bool
    where
        F: FnOnce(&mut Item),
    {
        let updated = {
            let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
            match items.get_mut(id) {
                Some(item) => {
                    f(item);
                    Some(item.clone())
                }
                None => None,
            }
        };
        match updated {
            Some(item) => {
                self.notify(*id, ItemUpdateKind::Updated, Some(item));
                true
            }
            None => false,
        }
    }

    /// Remove an item. Returns the removed item.
    pub fn remove(&self, id: &ItemId) -> Option<Item> {
        let removed = self
            .items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        if removed.is_some() {
            self.notify(*id, ItemUpdateKind::Deleted, None);
        }
        removed
    }
}

impl fmt::Debug for ItemManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemManager")
            .field("items", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: ItemId) -> Item {
        Item {
            id,
            model_type: "spacegate:object".into(),
            parent: None,
            props: BTreeMap::new(),
        }
    }

    #[test]
    fn test_item_id_hex() {
        let id = ItemId::random();
        assert_eq!(ItemId::from_hex(&id.to_hex()).unwrap(), id);
        assert!(ItemId::from_hex("00").is_err());
    }

    #[tokio::test]
    async fn test_updates_are_broadcast() {
        let items = ItemManager::new();
        let mut rx = items.subscribe();
        let id = ItemId::random();

        items.upsert(item(id));
        assert!(items.update(&id, |i| {
            i.props.insert("title".into(), Value::from("hello"));
        }));
        assert!(items.remove(&id).is_some());
        assert!(!items.update(&id, |_| {}));

        let kinds: Vec<_> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .into_iter()
        .map(|u| u.kind)
        .collect();
        assert_eq!(
            kinds,
            vec![
                ItemUpdateKind::Created,
                ItemUpdateKind::Updated,
                ItemUpdateKind::Deleted
            ]
        );
        assert!(items.is_empty());
    }
}
