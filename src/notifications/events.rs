//! Ride notification events
//!
//! Everything presentation layers can observe about the active ride.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ClientRideState, ClientRideStatus};

/// Event types for notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RideEvent {
    /// Client ride state changed and should be re-rendered
    StateChanged(StateChangedEvent),
    /// An explicit user action failed (one-shot message near the control)
    ActionFailed(ActionFailedEvent),
    /// Live channel could not be opened
    ChannelError(ChannelErrorEvent),
}

impl RideEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            RideEvent::StateChanged(_) => "state_changed",
            RideEvent::ActionFailed(_) => "action_failed",
            RideEvent::ChannelError(_) => "channel_error",
        }
    }

    /// Booking the event concerns, if any
    pub fn booking_id(&self) -> Option<&str> {
        match self {
            RideEvent::StateChanged(e) => e.state.booking_id.as_ref().map(|id| id.as_str()),
            RideEvent::ActionFailed(_) => None,
            RideEvent::ChannelError(e) => Some(&e.booking_id),
        }
    }
}

/// Client ride state changed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedEvent {
    pub previous_status: ClientRideStatus,
    pub state: ClientRideState,
    pub timestamp: DateTime<Utc>,
}

/// Explicit action failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFailedEvent {
    /// Action name, e.g. `book_ride`
    pub action: String,
    /// Error kind label
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Live channel failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelErrorEvent {
    pub booking_id: String,
    pub topic: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper with metadata for broadcasting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RideEvent,
}

impl EventMessage {
    pub fn new(event: RideEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}
