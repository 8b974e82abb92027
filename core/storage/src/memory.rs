//! In-memory key-value store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use civicsync_common::{Error, Result};
use crate::store::{KeyValueStore, UpdateFn};

/// In-memory key-value store.
///
/// Useful for testing and ephemeral sessions. All data is stored in memory
/// and lost on drop. Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a storage error.
    ///
    /// Reads keep working. Used to exercise storage-failure paths.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, String>>> {
        self.entries
            .read()
            .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, String>>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("Write rejected by memory store".to_string()));
        }
        self.entries
            .write()
            .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.write()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.write()?.remove(key);
        Ok(())
    }

    async fn multi_remove(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.write()?;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }

    async fn set_many(&self, pairs: Vec<(String, String)>) -> Result<()> {
        let mut entries = self.write()?;
        entries.extend(pairs);
        Ok(())
    }

    async fn update(&self, key: &str, apply: UpdateFn) -> Result<Option<String>> {
        // The write lock is held across read and write so updates serialize.
        let mut entries = self.write()?;
        let next = apply(entries.get(key).cloned())?;
        match &next {
            Some(value) => {
                entries.insert(key.to_string(), value.clone());
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(next)
    }
}
