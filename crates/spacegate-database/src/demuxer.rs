//! Applies feed messages to the object index.
//!
//! The demuxer tracks, per data feed, the highest sequence number it has
//! consumed. Messages at or below that position are skipped, so a message
//! redelivered after a snapshot restore or a reconnect is never applied
//! twice.
//!
//! Applying a message and capturing a snapshot hold the same lock, so a
//! snapshot never contains a mutation newer than its timeframe.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use spacegate_core::Timeframe;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::error::{DatabaseError, Result};
use crate::item::{Item, ItemId, ItemManager};
use crate::model::ModelRegistry;
use crate::mutation::{FeedMessage, ItemMutation};
use crate::snapshot::{DatabaseSnapshot, ItemSnapshot};

/// Routes mutations to items and publishes the processed timeframe.
pub struct ItemDemuxer {
    items: Arc<ItemManager>,
    models: Arc<ModelRegistry>,
    timeframe: Arc<watch::Sender<Timeframe>>,
    apply_lock: Mutex<()>,
}

impl ItemDemuxer {
    pub fn new(items: Arc<ItemManager>, models: Arc<ModelRegistry>) -> Self {
        let (timeframe, _) = watch::channel(Timeframe::new());
        Self::with_timeframe(items, models, Arc::new(timeframe))
    }

    /// Publish progress through an existing timeframe channel.
    pub fn with_timeframe(
        items: Arc<ItemManager>,
        models: Arc<ModelRegistry>,
        timeframe: Arc<watch::Sender<Timeframe>>,
    ) -> Self {
        Self {
            items,
            models,
            timeframe,
            apply_lock: Mutex::new(()),
        }
    }

    pub fn items(&self) -> &Arc<ItemManager> {
        &self.items
    }

    /// Positions consumed so far.
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe.borrow().clone()
    }

    pub fn subscribe_timeframe(&self) -> watch::Receiver<Timeframe> {
        self.timeframe.subscribe()
    }

    /// Apply one message.
    ///
    /// Returns false if the message was at or below the consumed position.
    /// The position advances whether or not the mutation applies; an error
    /// reports a mutation that left the index unchanged.
    pub fn apply(&self, message: &FeedMessage) -> Result<bool> {
        let _guard = self.apply_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self
            .timeframe
            .borrow()
            .get(&message.feed_key)
            .map_or(false, |seen| message.seq <= seen)
        {
            trace!(feed_key = %message.feed_key, seq = message.seq, "skipping consumed message");
            return Ok(false);
        }

        let result = self.apply_mutation(message.envelope.item_id, &message.envelope.mutation);
        self.timeframe.send_modify(|tf| {
            tf.set(message.feed_key, message.seq);
        });
        result.map(|_| true)
    }

    fn apply_mutation(&self, item_id: ItemId, mutation: &ItemMutation) -> Result<()> {
        match mutation {
            ItemMutation::Genesis {
                model_type,
                parent,
                props,
            } => {
                if !self.models.has_model(model_type) {
                    return Err(DatabaseError::UnknownModel(model_type.clone()));
                }
                if self.items.contains(&item_id) {
                    return Err(DatabaseError::ItemExists(item_id));
                }
                if let Some(parent) = parent {
                    if !self.items.contains(parent) {
                        return Err(DatabaseError::MissingParent {
                            item: item_id,
                            parent: *parent,
                        });
                    }
                }
                self.items.upsert(Item {
                    id: item_id,
                    model_type: model_type.clone(),
                    parent: *parent,
                    props: props.clone(),
                });
                Ok(())
            }
            ItemMutation::Set { key, value } => {
                let applied = self.items.update(&item_id, |item| {
                    item.props.insert(key.clone(), value.clone());
                });
                applied.then_some(()).ok_or(DatabaseError::UnknownItem(item_id))
            }
            ItemMutation::Unset { key } => {
                let applied = self.items.update(&item_id, |item| {
                    item.props.remove(key);
                });
                applied.then_some(()).ok_or(DatabaseError::UnknownItem(item_id))
            }
            ItemMutation::Delete => self
                .items
                .remove(&item_id)
                .map(|_| ())
                .ok_or(DatabaseError::UnknownItem(item_id)),
        }
    }

    /// Capture the index and consumed timeframe.
    pub fn create_snapshot(&self) -> DatabaseSnapshot {
        let _guard = self.apply_lock.lock().unwrap_or_else(|e| e.into_inner());
        let timeframe = self.timeframe();
        let items = order_parents_first(self.items.items().into_iter().map(ItemSnapshot::from).collect());
        DatabaseSnapshot { timeframe, items }
    }

    /// Load a snapshot into the index.
    ///
    /// Every model type and parent link is validated before anything is
    /// inserted; on error the index is untouched.
    pub fn restore_from_snapshot(&self, snapshot: &DatabaseSnapshot) -> Result<()> {
        let _guard = self.apply_lock.lock().unwrap_or_else(|e| e.into_inner());
        let in_snapshot: HashSet<ItemId> = snapshot.items.iter().map(|i| i.id).collect();

        for item in &snapshot.items {
            if !self.models.has_model(&item.model_type) {
                return Err(DatabaseError::UnknownModel(item.model_type.clone()));
            }
            if let Some(parent) = item.parent {
                if !in_snapshot.contains(&parent) && !self.items.contains(&parent) {
                    return Err(DatabaseError::MissingParent {
                        item: item.id,
                        parent,
                    });
                }
            }
        }

        let ordered = order_parents_first(snapshot.items.clone());
        let count = ordered.len();
        for item in ordered {
            self.items.upsert(item.into());
        }

        self.timeframe.send_modify(|tf| tf.merge(&snapshot.timeframe));
        debug!(items = count, "restored snapshot");
        Ok(())
    }
}

/// Stable topological order: each item after its parent.
///
/// Items whose parent is outside the list keep their relative order at the
/// front. Cycles are appended in input order.
fn order_parents_first(items: Vec<ItemSnapshot>) -> Vec<ItemSnapshot> {
    let ids: HashSet<ItemId> = items.iter().map(|i| i.id).collect();
    let mut placed: BTreeSet<ItemId> = BTreeSet::new();
    let mut remaining = items;
    let mut ordered = Vec::with_capacity(remaining.len());

    loop {
        let before = remaining.len();
        let (ready, blocked): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|item| {
            item.parent
                .map_or(true, |p| !ids.contains(&p) || placed.contains(&p))
        });
        for item in &ready {
            placed.insert(item.id);
        }
        ordered.extend(ready);
        remaining = blocked;
        if remaining.is_empty() || remaining.len() == before {
            break;
        }
    }

    ordered.extend(remaining);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OBJECT_MODEL;
    use crate::mutation::EchoEnvelope;
    use serde_json::Value;
    use spacegate_core::PublicKey;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn demuxer() -> ItemDemuxer {
        ItemDemuxer::new(Arc::new(ItemManager::new()), Arc::new(ModelRegistry::new()))
    }

    fn genesis(parent: Option<ItemId>) -> ItemMutation {
        ItemMutation::Genesis {
            model_type: OBJECT_MODEL.into(),
            parent,
            props: BTreeMap::new(),
        }
    }

    fn message(feed: u8, seq: u64, item_id: ItemId, mutation: ItemMutation) -> FeedMessage {
        FeedMessage {
            feed_key: PublicKey::from_bytes([feed; 32]),
            seq,
            envelope: EchoEnvelope::new(item_id, mutation),
        }
    }

    #[test]
    fn test_apply_mutations() {
        let demuxer = demuxer();
        let id = ItemId::random();

        assert!(demuxer.apply(&message(1, 1, id, genesis(None))).unwrap());
        assert!(demuxer
            .apply(&message(
                1,
                2,
                id,
                ItemMutation::Set {
                    key: "title".into(),
                    value: Value::from("hi")
                }
            ))
            .unwrap());

        let item = demuxer.items().get_item(&id).unwrap();
        assert_eq!(item.props.get("title"), Some(&Value::from("hi")));
        assert_eq!(demuxer.timeframe().get(&PublicKey::from_bytes([1; 32])), Some(2));
    }

    #[test]
    fn test_redelivery_skipped() {
        let demuxer = demuxer();
        let id = ItemId::random();
        let first = message(1, 1, id, genesis(None));

        assert!(demuxer.apply(&first).unwrap());
        assert!(!demuxer.apply(&first).unwrap());
        assert_eq!(demuxer.items().len(), 1);
    }

    #[test]
    fn test_failed_mutation_advances_position() {
        let demuxer = demuxer();
        let ghost = ItemId::random();
        let result = demuxer.apply(&message(1, 1, ghost, ItemMutation::Delete));

        assert!(matches!(result, Err(DatabaseError::UnknownItem(_))));
        assert_eq!(demuxer.timeframe().get(&PublicKey::from_bytes([1; 32])), Some(1));
    }

    #[test]
    fn test_unknown_model_rejected() {
        let demuxer = demuxer();
        let id = ItemId::random();
        let result = demuxer.apply(&message(
            1,
            1,
            id,
            ItemMutation::Genesis {
                model_type: "example:unknown".into(),
                parent: None,
                props: BTreeMap::new(),
            },
        ));
        assert!(matches!(result, Err(DatabaseError::UnknownModel(_))));
        assert!(demuxer.items().is_empty());
    }

    #[test]
    fn test_snapshot_restore_parents_first() {
        let source = demuxer();
        let parent = ItemId::from_bytes([0xff; 32]);
        let child = ItemId::from_bytes([0x01; 32]);
        source.apply(&message(1, 1, parent, genesis(None))).unwrap();
        source.apply(&message(1, 2, child, genesis(Some(parent)))).unwrap();

        let snapshot = source.create_snapshot();
        // Child sorts first by id; ordering must still put the parent first.
        assert_eq!(snapshot.items[0].id, parent);

        let target = demuxer();
        target.restore_from_snapshot(&snapshot).unwrap();
        assert_eq!(target.items().len(), 2);
        assert_eq!(target.timeframe(), snapshot.timeframe);

        // Replayed feed messages covered by the snapshot are skipped.
        assert!(!target.apply(&message(1, 2, child, genesis(Some(parent)))).unwrap());
    }

    #[test]
    fn test_restore_validates_before_mutating() {
        let target = demuxer();
        let orphan = ItemId::random();
        let good = ItemId::random();
        let snapshot = DatabaseSnapshot {
            timeframe: Timeframe::new(),
            items: vec![
                ItemSnapshot {
                    id: good,
                    model_type: OBJECT_MODEL.into(),
                    parent: None,
                    props: BTreeMap::new(),
                },
                ItemSnapshot {
                    id: orphan,
                    model_type: OBJECT_MODEL.into(),
                    parent: Some(ItemId::random()),
                    props: BTreeMap::new(),
                },
            ],
        };

        assert!(matches!(
            target.restore_from_snapshot(&snapshot),
            Err(DatabaseError::MissingParent { .. })
        ));
        assert!(target.items().is_empty());

        let bad_model = DatabaseSnapshot {
            timeframe: Timeframe::new(),
            items: vec![ItemSnapshot {
                id: good,
                model_type: "example:unknown".into(),
                parent: None,
                props: BTreeMap::new(),
            }],
        };
        assert!(matches!(
            target.restore_from_snapshot(&bad_model),
            Err(DatabaseError::UnknownModel(_))
        ));
        assert!(target.items().is_empty());
    }

    #[test]
    fn test_snapshot_bytes() {
        let source = demuxer();
        let id = ItemId::random();
        source.apply(&message(3, 1, id, genesis(None))).unwrap();

        let snapshot = source.create_snapshot();
        let decoded = DatabaseSnapshot::from_bytes(&snapshot.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_snapshot_consistent_with_concurrent_apply() {
        let demuxer = Arc::new(demuxer());
        let feed = PublicKey::from_bytes([1; 32]);
        const MESSAGES: u64 = 5_000;

        let writer = {
            let demuxer = demuxer.clone();
            std::thread::spawn(move || {
                for seq in 1..=MESSAGES {
                    demuxer
                        .apply(&message(1, seq, ItemId::random(), genesis(None)))
                        .unwrap();
                }
            })
        };

        let mut taken = 0;
        while !writer.is_finished() || taken == 0 {
            let snapshot = demuxer.create_snapshot();
            let seq = snapshot.timeframe.get(&feed).unwrap_or(0);
            assert_eq!(snapshot.items.len() as u64, seq);
            taken += 1;
        }
        writer.join().unwrap();

        let last = demuxer.create_snapshot();
        assert_eq!(last.items.len() as u64, MESSAGES);
        assert_eq!(last.timeframe.get(&feed), Some(MESSAGES));
    }

    proptest! {
        #[test]
        fn test_redelivery_never_reapplies(
            values in prop::collection::vec(any::<i64>(), 1..20),
            redeliver in prop::collection::vec(any::<bool>(), 20),
        ) {
            let demuxer = demuxer();
            let id = ItemId::from_bytes([0x11; 32]);
            demuxer.apply(&message(1, 1, id, genesis(None))).unwrap();

            let mut previous: Option<FeedMessage> = None;
            for (i, value) in values.iter().enumerate() {
                let set = message(1, i as u64 + 2, id, ItemMutation::Set {
                    key: "n".into(),
                    value: Value::from(*value),
                });
                prop_assert!(demuxer.apply(&set).unwrap());
                if redeliver[i] {
                    if let Some(prev) = &previous {
                        prop_assert!(!demuxer.apply(prev).unwrap());
                    }
                    prop_assert!(!demuxer.apply(&set).unwrap());
                }
                previous = Some(set);
            }

            let item = demuxer.items().get_item(&id).unwrap();
            let expected = values.last().map(|v| Value::from(*v));
            prop_assert_eq!(item.props.get("n"), expected.as_ref());
        }
    }
}
