//! Booking domain entity, as reported by the fleet server

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ── BookingId ──────────────────────────────────────────────────

/// Opaque booking identifier, stable for the ride's lifetime.
///
/// The server sends a JSON number; persisted state and topics use the
/// string form. Both are accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a persisted id. Blank strings are not ids.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookingId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<u64> for BookingId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for BookingId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Ok(Self(n.to_string())),
            RawId::Text(s) => BookingId::parse(&s)
                .ok_or_else(|| serde::de::Error::custom("booking id must not be blank")),
        }
    }
}

// ── BookingStatus ──────────────────────────────────────────────

/// Server-side booking status vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Waiting for a driver. `PENDING` on the wire.
    #[serde(alias = "PENDING")]
    Requested,
    /// A driver accepted and is on the way
    Accepted,
    /// Customer picked up
    Started,
    /// Ride finished
    Completed,
    /// Ride cancelled by either side
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Accepted => "ACCEPTED",
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether no further transitions can follow
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── GeoPoint ───────────────────────────────────────────────────

/// WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

// ── BookingDetails ─────────────────────────────────────────────

/// Descriptive booking fields carried through without interpretation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<String>,
}

impl BookingDetails {
    /// Overwrite every field `incoming` carries; absent fields keep their value.
    pub fn merge_from(&mut self, incoming: &BookingDetails) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        take(&mut self.customer_id, &incoming.customer_id);
        take(&mut self.driver_id, &incoming.driver_id);
        take(&mut self.origin, &incoming.origin);
        take(&mut self.destination, &incoming.destination);
        take(&mut self.vehicle_type, &incoming.vehicle_type);
        take(&mut self.price, &incoming.price);
        take(&mut self.distance, &incoming.distance);
    }
}

// ── BookingSnapshot ────────────────────────────────────────────

/// Full server-reported state of one booking at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSnapshot {
    pub id: BookingId,
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_lng: Option<f64>,
    #[serde(flatten)]
    pub details: BookingDetails,
}

impl BookingSnapshot {
    pub fn new(id: impl Into<BookingId>, status: BookingStatus) -> Self {
        Self {
            id: id.into(),
            status,
            driver_lat: None,
            driver_lng: None,
            details: BookingDetails::default(),
        }
    }

    pub fn with_driver_position(mut self, position: GeoPoint) -> Self {
        self.driver_lat = Some(position.lat);
        self.driver_lng = Some(position.lng);
        self
    }

    pub fn with_details(mut self, details: BookingDetails) -> Self {
        self.details = details;
        self
    }

    /// Driver position, present only when both coordinates are.
    pub fn driver_position(&self) -> Option<GeoPoint> {
        match (self.driver_lat, self.driver_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        }
    }

    /// Decode a push payload or response body.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

// ── BookingRequest ─────────────────────────────────────────────

/// Payload for creating a booking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    pub origin: String,
    pub destination: String,
    pub vehicle_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<String>,
}

impl BookingRequest {
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        vehicle_type: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: None,
            origin: origin.into(),
            destination: destination.into(),
            vehicle_type: vehicle_type.into(),
            price: None,
            distance: None,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_server_booking() {
        let body = r#"{
            "id": 42,
            "customerId": 7,
            "driverId": null,
            "origin": "MG Road, Bangalore",
            "destination": "Indiranagar, Bangalore",
            "vehicleType": "fastest",
            "price": 175.0,
            "distance": "12.5 km",
            "status": "PENDING",
            "driverLat": null,
            "driverLng": null
        }"#;
        let snapshot = BookingSnapshot::from_json(body).unwrap();
        assert_eq!(snapshot.id.as_str(), "42");
        assert_eq!(snapshot.status, BookingStatus::Requested);
        assert_eq!(snapshot.driver_position(), None);
        assert_eq!(snapshot.details.customer_id, Some(7));
        assert_eq!(snapshot.details.distance.as_deref(), Some("12.5 km"));
    }

    #[test]
    fn accepts_string_ids_and_requested_spelling() {
        let snapshot =
            BookingSnapshot::from_json(r#"{"id":"b-9","status":"REQUESTED"}"#).unwrap();
        assert_eq!(snapshot.id, BookingId::new("b-9"));
        assert_eq!(snapshot.status, BookingStatus::Requested);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(BookingSnapshot::from_json(r#"{"id":1,"status":"TELEPORTED"}"#).is_err());
        assert!(BookingSnapshot::from_json(r#"{"id":"  ","status":"STARTED"}"#).is_err());
    }

    #[test]
    fn position_requires_both_coordinates() {
        let half = BookingSnapshot::from_json(r#"{"id":1,"status":"ACCEPTED","driverLat":12.9}"#)
            .unwrap();
        assert_eq!(half.driver_position(), None);

        let full = BookingSnapshot::new(1u64, BookingStatus::Started)
            .with_driver_position(GeoPoint::new(12.9, 77.6));
        assert_eq!(full.driver_position(), Some(GeoPoint::new(12.9, 77.6)));
    }

    #[test]
    fn merge_keeps_fields_the_update_omits() {
        let mut held = BookingDetails {
            origin: Some("MG Road".into()),
            price: Some(120.0),
            ..Default::default()
        };
        held.merge_from(&BookingDetails {
            price: Some(140.0),
            driver_id: Some(3),
            ..Default::default()
        });
        assert_eq!(held.origin.as_deref(), Some("MG Road"));
        assert_eq!(held.price, Some(140.0));
        assert_eq!(held.driver_id, Some(3));
    }

    #[test]
    fn blank_persisted_ids_are_ignored() {
        assert_eq!(BookingId::parse(""), None);
        assert_eq!(BookingId::parse("null"), None);
        assert_eq!(BookingId::parse(" 42 "), Some(BookingId::new("42")));
    }
}
