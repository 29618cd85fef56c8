//! # NeuroFleetX ride sync
//!
//! Client-side ride lifecycle synchronization for the NeuroFleetX customer
//! dashboard: restore the active booking after a restart, follow it over
//! REST and a STOMP push channel, and reconcile every snapshot into one
//! monotonic ride state.
//!
//! ## Architecture
//!
//! - **domain**: booking snapshots, client ride state and the reconcile rule
//! - **application**: the lifecycle core, its ports and the owning task
//! - **infrastructure**: REST, STOMP, storage and session adapters
//! - **notifications**: change events presentation layers listen to
//! - **tracker**: ready-wired runtime used by the CLI

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod notifications;
pub mod shared;
pub mod tracker;

pub use config::{default_config_path, AppConfig};

pub use application::{
    BookingLifecycle, LifecycleConfig, LifecycleDeps, RideSyncHandle, RideSyncRunner, RunnerError,
};
pub use domain::{
    BookingId, BookingRequest, BookingSnapshot, BookingStatus, ClientRideState, ClientRideStatus,
    RideFlags, RouteChoice, SyncError, SyncResult,
};

// Re-export notifications
pub use notifications::{create_event_bus, EventMessage, RideEvent, SharedRideEventBus};

pub use tracker::{init_tracing, TrackerError, TrackerHandle, TrackerOptions};
