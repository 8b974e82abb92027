//! Store registry for resolving a backend from configuration.

use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use civicsync_common::{Error, Result};
use crate::store::KeyValueStore;

/// Factory function type for creating stores.
pub type StoreFactory = Box<dyn Fn(Value) -> Result<Arc<dyn KeyValueStore>> + Send + Sync>;

/// Registry for key-value store factories.
///
/// Allows the composing application to pick a backend by name and
/// configuration.
pub struct StoreRegistry {
    factories: HashMap<String, StoreFactory>,
}

impl StoreRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a store factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: StoreFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::InvalidInput(format!(
                "Store backend '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a store by name and configuration.
    ///
    /// # Errors
    /// - Backend not registered
    /// - Configuration invalid for the backend
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn KeyValueStore>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::NotFound(format!("Store backend '{}' is not registered", name))
        })?;
        factory(config)
    }

    /// Get list of registered backend names.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend is registered.
    pub fn has_backend(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn path_from_config(config: &Value, backend: &str) -> Result<PathBuf> {
    config
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .ok_or_else(|| {
            Error::Config(format!("Store backend '{}' requires a 'path' string", backend))
        })
}

/// Create a registry with the built-in backends registered.
pub fn create_default_registry() -> StoreRegistry {
    let mut registry = StoreRegistry::new();

    let builtins: [(&str, StoreFactory); 3] = [
        (
            "memory",
            Box::new(|_config| Ok(Arc::new(crate::memory::MemoryStore::new()) as Arc<dyn KeyValueStore>)),
        ),
        (
            "file",
            Box::new(|config| {
                let path = path_from_config(&config, "file")?;
                Ok(Arc::new(crate::local::FileStore::open(path)?) as Arc<dyn KeyValueStore>)
            }),
        ),
        (
            "sqlite",
            Box::new(|config| {
                let path = path_from_config(&config, "sqlite")?;
                Ok(Arc::new(crate::sqlite::SqliteStore::open(path)?) as Arc<dyn KeyValueStore>)
            }),
        ),
    ];

    for (name, factory) in builtins {
        // Fresh registry, names cannot collide.
        let _ = registry.register(name, factory);
    }

    registry
}
