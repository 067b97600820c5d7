//! Client handle over an object index and its backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::backend::DatabaseBackend;
use crate::error::{DatabaseError, Result};
use crate::item::{Item, ItemId, ItemManager, ItemUpdate};
use crate::model::ModelRegistry;
use crate::mutation::{EchoEnvelope, ItemMutation};
use crate::writer::{FeedWriter, WriteReceipt};

/// Reads come from the local index; writes go to the backend's write
/// stream and become visible once the backend applies them.
pub struct Database {
    backend: Arc<dyn DatabaseBackend>,
    items: Arc<ItemManager>,
    models: Arc<ModelRegistry>,
}

impl Database {
    pub fn new(backend: Arc<dyn DatabaseBackend>, models: Arc<ModelRegistry>) -> Self {
        Self {
            backend,
            items: Arc::new(ItemManager::new()),
            models,
        }
    }

    pub async fn open(&self) -> Result<()> {
        self.backend
            .open(self.items.clone(), self.models.clone())
            .await
    }

    pub async fn close(&self) -> Result<()> {
        self.backend.close().await
    }

    pub fn backend(&self) -> &Arc<dyn DatabaseBackend> {
        &self.backend
    }

    pub fn items(&self) -> &Arc<ItemManager> {
        &self.items
    }

    pub fn get_item(&self, id: &ItemId) -> Option<Item> {
        self.items.get_item(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ItemUpdate> {
        self.items.subscribe()
    }

    fn writer(&self) -> Result<Arc<dyn FeedWriter>> {
        self.backend.write_stream().ok_or(DatabaseError::ReadOnly)
    }

    /// Write a genesis mutation for a fresh item.
    pub async fn create_item(
        &self,
        model_type: &str,
        parent: Option<ItemId>,
        props: BTreeMap<String, Value>,
    ) -> Result<(ItemId, WriteReceipt)> {
        if !self.models.has_model(model_type) {
            return Err(DatabaseError::UnknownModel(model_type.to_string()));
        }
        let id = ItemId::random();
        let mutation = ItemMutation::Genesis {
            model_type: model_type.to_string(),
            parent,
            props,
        };
        let receipt = self.writer()?.write(&EchoEnvelope::new(id, mutation)).await?;
        Ok((id, receipt))
    }

    pub async fn set(&self, id: ItemId, key: &str, value: Value) -> Result<WriteReceipt> {
        let mutation = ItemMutation::Set {
            key: key.to_string(),
            value,
        };
        self.writer()?.write(&EchoEnvelope::new(id, mutation)).await
    }

    pub async fn unset(&self, id: ItemId, key: &str) -> Result<WriteReceipt> {
        let mutation = ItemMutation::Unset {
            key: key.to_string(),
        };
        self.writer()?.write(&EchoEnvelope::new(id, mutation)).await
    }

    pub async fn delete(&self, id: ItemId) -> Result<WriteReceipt> {
        self.writer()?
            .write(&EchoEnvelope::new(id, ItemMutation::Delete))
            .await
    }
}
