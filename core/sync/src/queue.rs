//! Durable FIFO of writes made while the backend was unreachable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use civicsync_common::{Result, TempId};
use civicsync_storage::{keys, KeyValueStore, KeyValueStoreExt};
use civicsync_transport::Method;

/// A write waiting to be replayed against the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    /// Client-generated temporary identifier.
    pub id: TempId,
    /// Position in the queue; strictly increasing across enqueues.
    pub seq: u64,
    /// Method of the original request.
    pub method: Method,
    /// Path of the original request, relative to the base endpoint.
    pub path: String,
    /// Original request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Always true; marks the write as created offline.
    pub offline: bool,
    /// When the write was queued.
    pub queued_at: DateTime<Utc>,
}

/// Persisted queue document.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueDocument {
    next_seq: u64,
    entries: Vec<QueuedMutation>,
}

/// Offline mutation queue over a [`KeyValueStore`].
///
/// The whole queue lives under a single key and every change goes through
/// one atomic `update`, so concurrent enqueues and removals never lose
/// entries.
#[derive(Clone)]
pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
}

impl OfflineQueue {
    /// Create a queue over the given store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Append a write to the end of the queue.
    ///
    /// # Postconditions
    /// - Exactly one new entry exists, after every existing entry
    ///
    /// # Errors
    /// - Storage failure (nothing is appended)
    pub async fn enqueue(
        &self,
        method: Method,
        path: impl Into<String>,
        payload: Option<Value>,
    ) -> Result<TempId> {
        let id = TempId::generate();
        let entry_id = id.clone();
        let path = path.into();

        let stored = self
            .store
            .update_json::<QueueDocument, _>(keys::OFFLINE_MUTATIONS, move |current| {
                let mut doc = current.unwrap_or_default();
                let seq = doc.next_seq;
                doc.next_seq += 1;
                doc.entries.push(QueuedMutation {
                    id: entry_id,
                    seq,
                    method,
                    path,
                    payload,
                    offline: true,
                    queued_at: Utc::now(),
                });
                Ok(Some(doc))
            })
            .await?;

        let pending = stored.map(|doc| doc.entries.len()).unwrap_or(0);
        info!(id = %id, pending, "queued offline write");
        Ok(id)
    }

    /// Snapshot of pending entries, oldest first.
    ///
    /// Nothing is removed; entries leave the queue only via
    /// [`remove_exactly`](Self::remove_exactly).
    pub async fn drain(&self) -> Result<Vec<QueuedMutation>> {
        let doc: Option<QueueDocument> = self.store.get_json(keys::OFFLINE_MUTATIONS).await?;
        let mut entries = doc.map(|d| d.entries).unwrap_or_default();
        entries.sort_by_key(|e| e.seq);
        Ok(entries)
    }

    /// Remove the entry with the given id.
    ///
    /// Returns whether the entry was present. Other entries are untouched.
    pub async fn remove_exactly(&self, id: &TempId) -> Result<bool> {
        let target = id.clone();
        let found = Arc::new(AtomicBool::new(false));
        let found_in_update = found.clone();

        // The document is kept even when empty so sequence numbers never repeat.
        self.store
            .update_json::<QueueDocument, _>(keys::OFFLINE_MUTATIONS, move |current| {
                let mut doc = current.unwrap_or_default();
                let before = doc.entries.len();
                doc.entries.retain(|e| e.id != target);
                found_in_update.store(doc.entries.len() != before, Ordering::SeqCst);
                Ok(Some(doc))
            })
            .await?;

        let removed = found.load(Ordering::SeqCst);
        if removed {
            debug!(id = %id, "removed queued write");
        }
        Ok(removed)
    }

    /// Number of pending entries.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.drain().await?.len())
    }

    /// Check if nothing is pending.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
