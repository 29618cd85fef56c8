//! Ride domain: the client view and its reconciliation rules

pub mod model;
pub mod reconcile;

pub use model::{ClientRideState, ClientRideStatus, RideFlags, RouteChoice};
pub use reconcile::{reconcile, target_status, Reconciliation, Transition};
