//! Key-value store trait definition.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use civicsync_common::{Error, Result};

/// Read-modify-write step passed to [`KeyValueStore::update`].
///
/// Receives the current value (`None` if absent) and returns the value to
/// store (`None` removes the key). Returning an error leaves the key untouched.
pub type UpdateFn = Box<dyn FnOnce(Option<String>) -> Result<Option<String>> + Send>;

/// Durable key-value store shared by the transport, cache, queue and session.
///
/// Values are opaque strings (JSON text in practice). Writes to distinct keys
/// are independent; every operation on a single key is atomic, and the
/// multi-key operations are all-or-nothing.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the backend name (e.g., "memory", "file", "sqlite").
    fn name(&self) -> &str;

    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove several keys at once.
    ///
    /// # Postconditions
    /// - Either every key is removed or the store is unchanged
    async fn multi_remove(&self, keys: &[&str]) -> Result<()>;

    /// Write several keys at once.
    ///
    /// # Postconditions
    /// - Either every entry is written or the store is unchanged
    async fn set_many(&self, entries: Vec<(String, String)>) -> Result<()>;

    /// Atomically read, transform and write back a single key.
    ///
    /// No other writer on this store can interleave between the read and the
    /// write. Returns the value that was stored.
    async fn update(&self, key: &str, apply: UpdateFn) -> Result<Option<String>>;
}

/// Typed JSON helpers on top of any [`KeyValueStore`].
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    /// Read and decode a JSON value.
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Encode and write a JSON value.
    async fn set_json<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw).await
    }

    /// Atomic read-modify-write of a JSON value.
    async fn update_json<T, F>(&self, key: &str, apply: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(Option<T>) -> Result<Option<T>> + Send + 'static,
    {
        let stored = self
            .update(
                key,
                Box::new(move |current| {
                    let current = match current {
                        Some(raw) => Some(serde_json::from_str::<T>(&raw)?),
                        None => None,
                    };
                    match apply(current)? {
                        Some(next) => Ok(Some(serde_json::to_string(&next)?)),
                        None => Ok(None),
                    }
                }),
            )
            .await?;

        match stored {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// Map a backend failure into the storage error kind.
pub(crate) fn storage_err(context: &str, err: impl std::fmt::Display) -> Error {
    Error::Storage(format!("{}: {}", context, err))
}
