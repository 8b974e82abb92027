//! Session token lookup for outgoing requests.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use civicsync_common::{AuthToken, Result};
use civicsync_storage::{keys, KeyValueStore};

/// Source of the bearer token attached to each request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current token, or `None` when signed out.
    ///
    /// # Errors
    /// - Storage failure while reading the token
    async fn token(&self) -> Result<Option<AuthToken>>;
}

/// Reads the raw token from the durable store on every call.
///
/// Reading per call means login and logout take effect on the very next
/// request without any cache invalidation.
pub struct StoreTokenProvider {
    store: Arc<dyn KeyValueStore>,
}

impl StoreTokenProvider {
    /// Create a provider over the given store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TokenProvider for StoreTokenProvider {
    async fn token(&self) -> Result<Option<AuthToken>> {
        let raw = self.store.get(keys::AUTH_TOKEN).await?;
        Ok(raw.filter(|t| !t.is_empty()).map(AuthToken::new))
    }
}

/// In-memory token holder.
#[derive(Default)]
pub struct StaticTokenProvider {
    token: RwLock<Option<AuthToken>>,
}

impl StaticTokenProvider {
    /// Create a provider holding the given token.
    pub fn new(token: Option<AuthToken>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    /// Replace the held token.
    pub async fn set(&self, token: Option<AuthToken>) {
        *self.token.write().await = token;
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<Option<AuthToken>> {
        Ok(self.token.read().await.clone())
    }
}
