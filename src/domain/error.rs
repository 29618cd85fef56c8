//! Sync errors

use thiserror::Error;

/// Failures the ride sync core can observe from its collaborators.
///
/// Passive sync paths (push messages, background refresh) handle every
/// variant locally; only explicit user actions hand them back to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Fetch or channel unreachable
    #[error("Network error: {0}")]
    Network(String),

    /// Booking id no longer exists server-side
    #[error("Booking not found: {0}")]
    NotFound(String),

    /// Server rejected the request payload
    #[error("Validation: {0}")]
    Validation(String),

    /// Missing or rejected session token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unparseable push payload
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Persisted state unreadable or unwritable
    #[error("Storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Whether the operation may succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }

    /// Short label used for metrics and event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Network(_) => "network",
            SyncError::NotFound(_) => "not_found",
            SyncError::Validation(_) => "validation",
            SyncError::Unauthorized(_) => "unauthorized",
            SyncError::MalformedMessage(_) => "malformed_message",
            SyncError::Storage(_) => "storage",
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::MalformedMessage(err.to_string())
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_transient() {
        assert!(SyncError::Network("timeout".into()).is_transient());
        assert!(!SyncError::NotFound("42".into()).is_transient());
        assert!(!SyncError::Validation("origin required".into()).is_transient());
        assert!(!SyncError::Storage("disk full".into()).is_transient());
    }

    #[test]
    fn json_errors_become_malformed_message() {
        let err: SyncError = serde_json::from_str::<serde_json::Value>("{nope")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "malformed_message");
    }
}
