//! Client configuration.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

use civicsync_common::{Error, Result};
use civicsync_sync::SyncConfig;
use civicsync_transport::TransportConfig;

/// Default backend endpoint for local development.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Directory name under the platform data directory.
const APP_DIR: &str = "civicsync";

/// Where durable state is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend name: `memory`, `file` or `sqlite`.
    pub backend: String,
    /// Location of the file or database; defaults under the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            path: None,
        }
    }
}

impl StorageConfig {
    /// In-memory storage; nothing survives the process.
    pub fn memory() -> Self {
        Self {
            backend: "memory".to_string(),
            path: None,
        }
    }

    /// Resolved backend path, if the backend needs one.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.path {
            return Some(path.clone());
        }
        match self.backend.as_str() {
            "file" => Some(default_data_dir().join("store.json")),
            "sqlite" => Some(default_data_dir().join("civicsync.db")),
            _ => None,
        }
    }

    /// JSON configuration handed to the store registry.
    pub fn registry_config(&self) -> serde_json::Value {
        match self.resolved_path() {
            Some(path) => json!({ "path": path.to_string_lossy() }),
            None => json!({}),
        }
    }
}

/// Configuration for a [`CivicClient`](crate::CivicClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend endpoint.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// User agent header.
    pub user_agent: String,
    /// Durable storage.
    pub storage: StorageConfig,
    /// Offline sync behavior.
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let transport = TransportConfig::new(DEFAULT_BASE_URL);
        Self {
            base_url: transport.base_url,
            timeout_secs: transport.timeout.as_secs(),
            user_agent: transport.user_agent,
            storage: StorageConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid client configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Check the configuration for invalid values.
    pub fn validate(&self) -> Result<()> {
        self.transport_config().validate()?;
        if !matches!(self.storage.backend.as_str(), "memory" | "file" | "sqlite") {
            return Err(Error::Config(format!(
                "Unknown storage backend '{}'",
                self.storage.backend
            )));
        }
        if let civicsync_sync::SyncMode::Periodic { interval }
        | civicsync_sync::SyncMode::Hybrid { interval } = &self.sync.mode
        {
            if interval.is_zero() {
                return Err(Error::Config("Sync interval must be greater than zero".to_string()));
            }
        }
        Ok(())
    }

    /// Transport settings derived from this configuration.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Platform data directory for civicsync state.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
