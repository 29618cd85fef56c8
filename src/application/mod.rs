//! Application layer - the ride lifecycle core and its ports

pub mod lifecycle;
pub mod ports;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use lifecycle::{
    inbox, BookingLifecycle, LifecycleConfig, LifecycleDeps, SnapshotSource, ACTIVE_BOOKING_KEY,
    ACTIVE_ROUTE_KEY, DEFAULT_INBOX_CAPACITY,
};
pub use ports::{
    BookingApi, ChannelMessage, KeyValueStore, LiveChannel, SessionStore, SubscriptionHandle,
};
pub use runner::{RideSyncHandle, RideSyncRunner, RunnerError};
