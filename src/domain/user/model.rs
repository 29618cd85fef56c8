//! User identity model

use serde::{Deserialize, Serialize};

/// Dashboard role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Manager,
    Driver,
    #[default]
    Customer,
}

/// User identity saved alongside the auth token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

/// Snapshot of the session store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthSession {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
}

impl AuthSession {
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_stored_user() {
        let user: UserProfile =
            serde_json::from_str(r#"{"id":5,"name":"Asha","role":"DRIVER"}"#).unwrap();
        assert_eq!(user.id, 5);
        assert_eq!(user.role, UserRole::Driver);
        assert_eq!(user.email, None);
    }

    #[test]
    fn empty_token_is_not_a_session() {
        let session = AuthSession {
            token: Some(String::new()),
            user: None,
        };
        assert!(!session.is_authenticated());
    }
}
