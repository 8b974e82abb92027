//! Login, logout and registration.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use civicsync_common::{AuthToken, Credentials, Error, Result, Session, SignupRequest, UserProfile};
use civicsync_storage::{keys, KeyValueStore};
use civicsync_transport::{Transport, TransportExt};

#[derive(Deserialize)]
struct LoginResponse {
    token: AuthToken,
    user: UserProfile,
}

/// Session lifecycle over the durable store.
///
/// The token and profile are always written and removed together.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn Transport>,
}

impl SessionManager {
    /// Create a session manager.
    pub fn new(store: Arc<dyn KeyValueStore>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Authenticate and persist the session.
    ///
    /// Failures are returned as-is; a login is never queued.
    ///
    /// # Errors
    /// - `InvalidInput` if email or password is empty
    /// - Any transport error
    /// - `Storage` if the session could not be persisted
    pub async fn login(&self, credentials: &Credentials) -> Result<Session> {
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            return Err(Error::InvalidInput(
                "Email and password are required".to_string(),
            ));
        }

        let response: LoginResponse = self.transport.post_json("/auth/login", credentials).await?;

        let user_json = serde_json::to_string(&response.user)?;
        self.store
            .set_many(vec![
                (keys::AUTH_TOKEN.to_string(), response.token.expose().to_string()),
                (keys::USER_DATA.to_string(), user_json),
            ])
            .await?;

        info!(user_id = %response.user.id, "signed in");
        Ok(Session {
            token: response.token,
            user: response.user,
        })
    }

    /// Remove the token and profile together.
    pub async fn logout(&self) -> Result<()> {
        self.store
            .multi_remove(&[keys::AUTH_TOKEN, keys::USER_DATA])
            .await?;
        info!("signed out");
        Ok(())
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, signup: &SignupRequest) -> Result<UserProfile> {
        if signup.email.trim().is_empty() || signup.password.is_empty() {
            return Err(Error::InvalidInput(
                "Email and password are required".to_string(),
            ));
        }

        let mut value: Value = self.transport.post_json("/auth/signup", signup).await?;

        // The backend wraps the user as `{message, user}`.
        let user = match value.get_mut("user") {
            Some(user) => user.take(),
            None => value,
        };
        let user: UserProfile = serde_json::from_value(user)?;
        info!(user_id = %user.id, "registered account");
        Ok(user)
    }

    /// The persisted session, if both token and profile are present.
    pub async fn current(&self) -> Result<Option<Session>> {
        let token = self.store.get(keys::AUTH_TOKEN).await?;
        let user = self.store.get(keys::USER_DATA).await?;

        let (Some(token), Some(user)) = (token, user) else {
            return Ok(None);
        };
        if token.is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<UserProfile>(&user) {
            Ok(user) => Ok(Some(Session {
                token: AuthToken::new(token),
                user,
            })),
            Err(e) => {
                warn!("stored profile is unreadable, treating as signed out: {}", e);
                Ok(None)
            }
        }
    }

    /// True if a session is persisted.
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.current().await?.is_some())
    }
}
