//! Storage ports for durable key-value storage and the auth session

use crate::domain::{AuthSession, SyncResult, UserProfile};

/// Durable string key-value storage shared with other components.
///
/// Reads are best-effort for callers; implementations still report
/// failures so callers can log them.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> SyncResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> SyncResult<()>;
    fn remove(&self, key: &str) -> SyncResult<()>;
}

/// Persists the auth token and user identity.
pub trait SessionStore: Send + Sync {
    fn get_auth(&self) -> AuthSession;
    fn save_auth(&self, token: &str, user: &UserProfile) -> SyncResult<()>;
    fn clear_auth(&self);
}
