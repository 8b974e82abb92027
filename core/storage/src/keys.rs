//! Well-known keys in the durable store.

/// Bearer token of the current session.
pub const AUTH_TOKEN: &str = "auth_token";

/// JSON profile of the signed-in user.
pub const USER_DATA: &str = "user_data";

/// Pending offline writes, oldest first.
pub const OFFLINE_MUTATIONS: &str = "offline_mutations";

/// Key holding the cache snapshot for a resource collection.
pub fn cache_key(collection: &str) -> String {
    format!("cached_{}", collection)
}
