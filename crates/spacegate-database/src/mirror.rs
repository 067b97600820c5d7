//! Mirrors a remote space database into a local index.

use std::collections::HashSet;
use std::sync::Arc;

use spacegate_core::PublicKey;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::item::{Item, ItemId, ItemManager, ItemUpdate, ItemUpdateKind};
use crate::service::DataService;

/// Live copy of a remote index. Stops when closed or dropped.
pub struct DataMirror {
    task: JoinHandle<()>,
}

impl DataMirror {
    /// Subscribe and load the current items before returning.
    pub async fn open(
        service: Arc<dyn DataService>,
        space_key: PublicKey,
        items: Arc<ItemManager>,
    ) -> Result<Self> {
        let subscription = service.subscribe(&space_key).await?;
        replace_all(&items, subscription.initial);
        let mut updates = subscription.updates;

        let task = tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => apply_update(&items, update),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(space_key = %space_key, skipped, "mirror lagged, resubscribing");
                        match service.subscribe(&space_key).await {
                            Ok(subscription) => {
                                replace_all(&items, subscription.initial);
                                updates = subscription.updates;
                            }
                            Err(e) => {
                                warn!(space_key = %space_key, error = %e, "mirror resubscribe failed");
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(space_key = %space_key, "mirror stopped");
        });

        Ok(Self { task })
    }

    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for DataMirror {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn apply_update(items: &ItemManager, update: ItemUpdate) {
    match (update.kind, update.item) {
        (ItemUpdateKind::Deleted, _) => {
            items.remove(&update.item_id);
        }
        (_, Some(item)) => items.upsert(item),
        (_, None) => {}
    }
}

fn replace_all(items: &ItemManager, initial: Vec<Item>) {
    let keep: HashSet<ItemId> = initial.iter().map(|i| i.id).collect();
    for stale in items.items().into_iter().filter(|i| !keep.contains(&i.id)) {
        items.remove(&stale.id);
    }
    for item in initial {
        items.upsert(item);
    }
}
