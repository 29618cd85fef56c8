//! Session store on top of durable key-value storage

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::ports::{KeyValueStore, SessionStore};
use crate::domain::{AuthSession, SyncResult, UserProfile};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const ROLE_KEY: &str = "role";

/// Keeps the auth token and user identity next to the ride restart state.
///
/// Clearing the session only removes the auth keys; an in-flight ride
/// survives a sign-out.
pub struct KvSessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl KvSessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Session entry unreadable");
                None
            }
        }
    }
}

impl SessionStore for KvSessionStore {
    fn get_auth(&self) -> AuthSession {
        let token = self.read(TOKEN_KEY).filter(|t| !t.is_empty());
        let user = self
            .read(USER_KEY)
            .and_then(|raw| match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "Stored user malformed, ignoring it");
                    None
                }
            });
        AuthSession { token, user }
    }

    fn save_auth(&self, token: &str, user: &UserProfile) -> SyncResult<()> {
        let raw = serde_json::to_string(user)?;
        self.store.set(TOKEN_KEY, token)?;
        self.store.set(USER_KEY, &raw)?;
        let role = serde_json::to_value(user.role)?;
        if let Some(role) = role.as_str() {
            self.store.set(ROLE_KEY, role)?;
        }
        info!(user_id = user.id, "Session saved");
        Ok(())
    }

    fn clear_auth(&self) {
        for key in [TOKEN_KEY, USER_KEY, ROLE_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to clear session entry");
            }
        }
        info!("Session cleared");
    }
}
