//! Read-through cache with cached and seeded fallbacks.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use civicsync_common::{Error, Issue, Result};
use civicsync_storage::{keys, KeyValueStore};
use civicsync_transport::{Method, Transport};

use crate::seed;

/// A collection type that can be fetched and cached.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection name; the snapshot key is `cached_<COLLECTION>`.
    const COLLECTION: &'static str;
    /// Endpoint path returning the whole collection.
    const PATH: &'static str;

    /// Fallback used when nothing else is available. Must not be empty.
    fn seed() -> Vec<Self>;
}

impl Resource for Issue {
    const COLLECTION: &'static str = "issues";
    const PATH: &'static str = "/issues";

    fn seed() -> Vec<Self> {
        seed::seed_issues()
    }
}

/// Where a returned collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionSource {
    /// Fresh from the backend.
    Network,
    /// Last successful fetch.
    Cache,
    /// Built-in placeholder data.
    Seed,
}

/// A fetched collection and its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<R> {
    pub items: Vec<R>,
    pub source: CollectionSource,
    /// When the items were fetched from the backend; `None` for seed data.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<R> Collection<R> {
    /// True unless the items came straight from the backend.
    pub fn is_stale(&self) -> bool {
        self.source != CollectionSource::Network
    }
}

/// Persisted cache snapshot.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<R> {
    fetched_at: Option<DateTime<Utc>>,
    items: Vec<R>,
}

/// Snapshots written by older clients are a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSnapshot<R> {
    Current(Snapshot<R>),
    Bare(Vec<R>),
}

/// Serves collection reads from the backend, falling back to the last
/// snapshot and then to seed data.
#[derive(Clone)]
pub struct ReadThroughCache {
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn Transport>,
}

impl ReadThroughCache {
    /// Create a cache over the given store and transport.
    pub fn new(store: Arc<dyn KeyValueStore>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Fetch a collection, never returning an empty fallback.
    ///
    /// # Postconditions
    /// - On a successful fetch the snapshot is replaced wholesale
    /// - On a failed fetch the snapshot is untouched
    ///
    /// # Errors
    /// - Storage failure reading the token, reading or writing the snapshot
    pub async fn fetch_collection<R: Resource>(&self) -> Result<Collection<R>> {
        let fetched = match self.transport.send(Method::Get, R::PATH, None).await {
            Ok(value) => serde_json::from_value::<Vec<R>>(value).map_err(|e| {
                Error::Serialization(format!("Unexpected {} payload: {}", R::COLLECTION, e))
            }),
            Err(e) => Err(e),
        };

        match fetched {
            Ok(items) => {
                let fetched_at = Utc::now();
                self.write_snapshot(&items, fetched_at).await?;
                debug!(collection = R::COLLECTION, count = items.len(), "cached fresh collection");
                Ok(Collection {
                    items,
                    source: CollectionSource::Network,
                    fetched_at: Some(fetched_at),
                })
            }
            Err(e) if e.is_storage() => Err(e),
            Err(e) => {
                warn!(collection = R::COLLECTION, "fetch failed, using fallback: {}", e);
                self.fallback().await
            }
        }
    }

    /// Current snapshot, without touching the network.
    ///
    /// Returns `None` if there is no usable non-empty snapshot.
    pub async fn cached<R: Resource>(&self) -> Result<Option<Collection<R>>> {
        let Some(snapshot) = self.read_snapshot::<R>().await? else {
            return Ok(None);
        };
        if snapshot.items.is_empty() {
            return Ok(None);
        }
        Ok(Some(Collection {
            items: snapshot.items,
            source: CollectionSource::Cache,
            fetched_at: snapshot.fetched_at,
        }))
    }

    async fn fallback<R: Resource>(&self) -> Result<Collection<R>> {
        if let Some(cached) = self.cached::<R>().await? {
            return Ok(cached);
        }
        debug!(collection = R::COLLECTION, "no usable snapshot, serving seed data");
        Ok(Collection {
            items: R::seed(),
            source: CollectionSource::Seed,
            fetched_at: None,
        })
    }

    async fn read_snapshot<R: Resource>(&self) -> Result<Option<Snapshot<R>>> {
        let key = keys::cache_key(R::COLLECTION);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<StoredSnapshot<R>>(&raw) {
            Ok(StoredSnapshot::Current(snapshot)) => Ok(Some(snapshot)),
            Ok(StoredSnapshot::Bare(items)) => Ok(Some(Snapshot {
                fetched_at: None,
                items,
            })),
            Err(e) => {
                warn!(key = %key, "ignoring undecodable cache snapshot: {}", e);
                Ok(None)
            }
        }
    }

    async fn write_snapshot<R: Resource>(&self, items: &[R], fetched_at: DateTime<Utc>) -> Result<()> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SnapshotRef<'a, R> {
            fetched_at: DateTime<Utc>,
            items: &'a [R],
        }

        let raw = serde_json::to_string(&SnapshotRef { fetched_at, items })?;
        self.store.set(&keys::cache_key(R::COLLECTION), raw).await
    }
}
