//! File-backed key-value store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use civicsync_common::{Error, Result};
use crate::store::{storage_err, KeyValueStore, UpdateFn};

/// Key-value store persisted as a single JSON document.
///
/// Every mutation writes the whole document to a sibling temporary file,
/// syncs it, and renames it over the original, so the on-disk document is
/// always either the old or the new version. The in-memory copy is only
/// replaced after the rename succeeds.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or create) a store at the given file path.
    ///
    /// # Postconditions
    /// - Parent directory exists
    /// - Existing entries are loaded
    ///
    /// # Errors
    /// - Parent directory cannot be created
    /// - Existing document cannot be read or is not valid JSON
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Sync I/O is fine here, this runs once at startup.
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    Error::Storage(format!(
                        "Corrupt store document {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened file store at {} ({} keys)", path.display(), entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "store.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write the document atomically.
    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        let temp = self.temp_path();

        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| storage_err("Failed to create temp file", e))?;
        file.write_all(&json)
            .await
            .map_err(|e| storage_err("Failed to write store document", e))?;
        file.sync_all()
            .await
            .map_err(|e| storage_err("Failed to sync store document", e))?;
        drop(file);

        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| storage_err("Failed to replace store document", e))
    }

    /// Apply a mutation to a copy, persist it, then commit it in memory.
    async fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        change(&mut next);
        if next == *entries {
            return Ok(());
        }
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.mutate(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.mutate(|entries| {
            entries.remove(key);
        })
        .await
    }

    async fn multi_remove(&self, keys: &[&str]) -> Result<()> {
        self.mutate(|entries| {
            for key in keys {
                entries.remove(*key);
            }
        })
        .await
    }

    async fn set_many(&self, pairs: Vec<(String, String)>) -> Result<()> {
        self.mutate(move |entries| entries.extend(pairs)).await
    }

    async fn update(&self, key: &str, apply: UpdateFn) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let next_value = apply(entries.get(key).cloned())?;

        let mut next = entries.clone();
        match &next_value {
            Some(value) => {
                next.insert(key.to_string(), value.clone());
            }
            None => {
                next.remove(key);
            }
        }

        self.persist(&next).await?;
        *entries = next;
        Ok(next_value)
    }
}
