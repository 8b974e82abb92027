//! Composed client: store, transport, cache, queue, session and sync.

use std::sync::Arc;
use tracing::info;

use civicsync_common::{Error, Result};
use civicsync_storage::{create_default_registry, KeyValueStore};
use civicsync_sync::{OfflineQueue, SyncEngine, SyncReport, SyncScheduler, SyncStatus};
use civicsync_transport::{HttpTransport, StoreTokenProvider, Transport};

use crate::cache::ReadThroughCache;
use crate::config::ClientConfig;
use crate::issues::IssuesApi;
use crate::session::SessionManager;

/// Entry point for UI code.
///
/// Each client owns its own store and transport; several isolated clients
/// can live in one process.
pub struct CivicClient {
    config: ClientConfig,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn Transport>,
    cache: ReadThroughCache,
    session: SessionManager,
    issues: IssuesApi,
    engine: Arc<SyncEngine>,
}

impl CivicClient {
    /// Build a client from configuration with the default store and transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Start a builder for injecting a custom store or transport.
    pub fn builder(config: ClientConfig) -> CivicClientBuilder {
        CivicClientBuilder {
            config,
            store: None,
            transport: None,
        }
    }

    /// Configuration the client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Durable store shared by every component.
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    /// Transport shared by every component.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Read-through cache.
    pub fn cache(&self) -> &ReadThroughCache {
        &self.cache
    }

    /// Session management.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Issue operations.
    pub fn issues(&self) -> &IssuesApi {
        &self.issues
    }

    /// Offline write queue.
    pub fn queue(&self) -> &OfflineQueue {
        self.engine.queue()
    }

    /// Sync engine.
    pub fn sync_engine(&self) -> Arc<SyncEngine> {
        self.engine.clone()
    }

    /// Run one sync pass now.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.engine.run_sync_pass().await
    }

    /// Sync engine status.
    pub async fn sync_status(&self) -> Result<SyncStatus> {
        self.engine.status().await
    }

    /// Spawn the background scheduler in the configured mode.
    ///
    /// Must be called from within a tokio runtime. The task stops when
    /// [`SyncScheduler::shutdown`] is called.
    pub fn start_scheduler(&self) -> SyncScheduler {
        let (scheduler, handle) = SyncScheduler::new(self.config.sync.mode.clone());
        tokio::spawn(handle.run_engine(self.engine.clone()));
        scheduler
    }
}

/// Builder for [`CivicClient`].
pub struct CivicClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
}

impl CivicClientBuilder {
    /// Use this store instead of the configured backend.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this transport instead of the HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Assemble the client.
    ///
    /// # Errors
    /// - `Config` if the configuration is invalid
    /// - `Storage` or `Io` if the configured store cannot be opened
    pub fn build(self) -> Result<CivicClient> {
        let config = self.config;
        config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => create_default_registry()
                .resolve(&config.storage.backend, config.storage.registry_config())
                .map_err(|e| match e {
                    Error::NotFound(msg) => Error::Config(msg),
                    other => other,
                })?,
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let tokens = Arc::new(StoreTokenProvider::new(store.clone()));
                Arc::new(HttpTransport::new(config.transport_config(), tokens)?)
                    as Arc<dyn Transport>
            }
        };

        let queue = OfflineQueue::new(store.clone());
        let cache = ReadThroughCache::new(store.clone(), transport.clone());
        let session = SessionManager::new(store.clone(), transport.clone());
        let issues = IssuesApi::new(transport.clone(), queue.clone(), cache.clone());
        let engine = Arc::new(SyncEngine::new(queue, transport.clone(), config.sync.clone()));

        info!(
            base_url = %config.base_url,
            store = store.name(),
            "civicsync client ready"
        );

        Ok(CivicClient {
            config,
            store,
            transport,
            cache,
            session,
            issues,
            engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    #[test]
    fn test_build_with_memory_store() {
        let config = ClientConfig {
            storage: StorageConfig::memory(),
            ..ClientConfig::default()
        };
        let client = CivicClient::new(config).unwrap();
        assert_eq!(client.store().name(), "memory");
    }

    #[tokio::test]
    async fn test_build_with_file_store() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = ClientConfig {
            storage: StorageConfig {
                backend: "file".to_string(),
                path: Some(temp.path().join("state.json")),
            },
            ..ClientConfig::default()
        };
        let client = CivicClient::new(config).unwrap();
        assert_eq!(client.store().name(), "file");
        assert!(client.queue().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_scheduler_runs_passes_on_request() {
        let config = ClientConfig {
            storage: StorageConfig::memory(),
            ..ClientConfig::default()
        };
        let client = CivicClient::new(config).unwrap();

        let scheduler = client.start_scheduler();
        let report = scheduler.request_sync().await.unwrap();
        assert_eq!(report.succeeded, 0);
        assert!(report.failed.is_empty());

        scheduler.shutdown().await;
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ClientConfig {
            base_url: "not a url".to_string(),
            storage: StorageConfig::memory(),
            ..ClientConfig::default()
        };
        assert!(matches!(CivicClient::new(config), Err(Error::Config(_))));
    }
}
