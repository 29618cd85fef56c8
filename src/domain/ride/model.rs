//! Client-side ride view

use serde::{Deserialize, Serialize};

use crate::domain::booking::{BookingDetails, BookingId, GeoPoint};

/// Client status vocabulary.
///
/// `Idle` also covers "ride just completed, awaiting feedback".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientRideStatus {
    #[default]
    Idle,
    Booked,
    Arriving,
    InTrip,
}

impl ClientRideStatus {
    /// Stage ordinal; only `Booked < Arriving < InTrip` are ordered.
    pub fn stage(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Booked => 1,
            Self::Arriving => 2,
            Self::InTrip => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Booked => "BOOKED",
            Self::Arriving => "ARRIVING",
            Self::InTrip => "IN_TRIP",
        }
    }
}

impl std::fmt::Display for ClientRideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The route the customer picked at booking time.
///
/// Held by the client until the ride closes; never refreshed from the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteChoice {
    /// Route flavour, e.g. `fastest` or `eco-friendly`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default)]
    pub coordinates: Vec<GeoPoint>,
}

impl RouteChoice {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }
}

/// Local derived view of the single active booking, exposed to presentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRideState {
    pub status: ClientRideStatus,
    pub booking_id: Option<BookingId>,
    pub active_route: Option<RouteChoice>,
    pub driver_location: Option<GeoPoint>,
    pub awaiting_feedback: bool,
    pub details: Option<BookingDetails>,
}

impl ClientRideState {
    /// Provisional state for a booking that has not been confirmed by a snapshot yet.
    pub fn booked(booking_id: BookingId, active_route: Option<RouteChoice>) -> Self {
        Self {
            status: ClientRideStatus::Booked,
            booking_id: Some(booking_id),
            active_route,
            ..Default::default()
        }
    }

    /// The booking finished and the completion has already been observed.
    pub fn is_completed(&self) -> bool {
        self.status == ClientRideStatus::Idle && self.awaiting_feedback
    }

    pub fn flags(&self) -> RideFlags {
        RideFlags::from(self)
    }
}

/// UI flags derived from [`ClientRideState`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RideFlags {
    pub tracking: bool,
    pub can_cancel: bool,
    pub driver_assigned: bool,
    pub show_feedback_prompt: bool,
    pub show_booking_form: bool,
}

impl From<&ClientRideState> for RideFlags {
    fn from(state: &ClientRideState) -> Self {
        let active = state.status != ClientRideStatus::Idle;
        Self {
            tracking: active,
            can_cancel: active,
            driver_assigned: matches!(
                state.status,
                ClientRideStatus::Arriving | ClientRideStatus::InTrip
            ),
            show_feedback_prompt: state.awaiting_feedback,
            show_booking_form: !active && !state.awaiting_feedback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_state_shows_booking_form() {
        let flags = ClientRideState::default().flags();
        assert!(flags.show_booking_form);
        assert!(!flags.tracking);
        assert!(!flags.can_cancel);
    }

    #[test]
    fn arriving_state_has_driver() {
        let state = ClientRideState {
            status: ClientRideStatus::Arriving,
            ..ClientRideState::booked(BookingId::new("7"), None)
        };
        let flags = state.flags();
        assert!(flags.tracking);
        assert!(flags.can_cancel);
        assert!(flags.driver_assigned);
        assert!(!flags.show_booking_form);
    }

    #[test]
    fn completed_state_prompts_for_feedback() {
        let state = ClientRideState {
            status: ClientRideStatus::Idle,
            awaiting_feedback: true,
            ..ClientRideState::booked(BookingId::new("7"), None)
        };
        assert!(state.is_completed());
        let flags = state.flags();
        assert!(flags.show_feedback_prompt);
        assert!(!flags.show_booking_form);
        assert!(!flags.can_cancel);
    }

    #[test]
    fn route_uses_type_key() {
        let route: RouteChoice = serde_json::from_str(
            r#"{"type":"eco-friendly","distance":"9.1 km","estimatedTime":"24 mins",
                "coordinates":[{"lat":12.97,"lng":77.59},{"lat":12.98,"lng":77.64}]}"#,
        )
        .unwrap();
        assert_eq!(route.kind, "eco-friendly");
        assert_eq!(route.coordinates.len(), 2);
        assert_eq!(route.price, None);
    }
}
