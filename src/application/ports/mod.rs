//! Application ports
//!
//! Contracts for every collaborator the ride sync core consumes. The core
//! only ever talks to these traits; concrete adapters live in
//! `infrastructure`.

pub mod outbound;
pub mod storage;

pub use outbound::{BookingApi, ChannelMessage, LiveChannel, SubscriptionHandle};
pub use storage::{KeyValueStore, SessionStore};
