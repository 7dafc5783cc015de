//! Owned schema registry.
//!
//! Construction registers the four built-in schemas. The registry is passed
//! explicitly to whoever needs schema lookups; there is no process-wide
//! instance.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::ConfigError;
use crate::schema::{
    ChatSchema, ClassificationSchema, DatasetStyle, InstructionSchema, PreferenceSchema, Schema,
};

/// Registry of available dataset schemas.
pub struct SchemaRegistry {
    schemas: HashMap<&'static str, Arc<dyn Schema>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Create a registry with the built-in schemas registered.
    pub fn new() -> Self {
        let mut registry = Self {
            schemas: HashMap::new(),
        };
        registry.register(Arc::new(InstructionSchema::new()));
        registry.register(Arc::new(ChatSchema::new()));
        registry.register(Arc::new(PreferenceSchema::new()));
        registry.register(Arc::new(ClassificationSchema::new()));
        registry
    }

    fn register(&mut self, schema: Arc<dyn Schema>) {
        self.schemas.insert(schema.name(), schema);
    }

    /// Look up a schema by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Schema>, ConfigError> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownSchema(name.to_string()))
    }

    /// Names of all registered schemas, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.schemas.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Names of schemas producing the given style.
    pub fn list_by_style(&self, style: DatasetStyle) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .schemas
            .values()
            .filter(|s| s.style() == style)
            .map(|s| s.name())
            .collect();
        names.sort_unstable();
        names
    }
}
