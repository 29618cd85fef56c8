//! Real-time ride notifications
//!
//! Change-notification mechanism presentation layers attach to for
//! re-rendering on state change.

pub mod event_bus;
pub mod events;

pub use event_bus::{create_event_bus, RideEventBus, RideEventSubscriber, SharedRideEventBus};
pub use events::{ActionFailedEvent, ChannelErrorEvent, EventMessage, RideEvent, StateChangedEvent};
