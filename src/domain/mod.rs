pub mod booking;
pub mod error;
pub mod ride;
pub mod user;

// Re-export commonly used types
pub use booking::{BookingDetails, BookingId, BookingRequest, BookingSnapshot, BookingStatus, GeoPoint};
pub use error::{SyncError, SyncResult};
pub use ride::{
    reconcile, target_status, ClientRideState, ClientRideStatus, Reconciliation, RideFlags,
    RouteChoice, Transition,
};
pub use user::{AuthSession, UserProfile, UserRole};
