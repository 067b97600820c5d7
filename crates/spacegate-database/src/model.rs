//! Registry of model types the index can hold.

use std::collections::BTreeSet;

/// Model type of plain objects.
pub const OBJECT_MODEL: &str = "spacegate:object";

/// Known model type names.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    types: BTreeSet<String>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let mut types = BTreeSet::new();
        types.insert(OBJECT_MODEL.to_string());
        Self { types }
    }
}

impl ModelRegistry {
    /// Registry that knows [`OBJECT_MODEL`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with no models.
    pub fn empty() -> Self {
        Self {
            types: BTreeSet::new(),
        }
    }

    pub fn register(&mut self, model_type: impl Into<String>) -> &mut Self {
        self.types.insert(model_type.into());
        self
    }

    pub fn has_model(&self, model_type: &str) -> bool {
        self.types.contains(model_type)
    }
}
