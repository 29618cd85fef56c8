//! Broadcast of ride events to UI observers
//!
//! A `tokio::sync::broadcast` channel: every observer sees every event in
//! publish order, and a slow observer skips ahead rather than stalling the
//! lifecycle.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::events::{EventMessage, RideEvent};

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct RideEventBus {
    sender: broadcast::Sender<EventMessage>,
}

impl RideEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish `event`; returns how many observers it reached.
    pub fn publish(&self, event: RideEvent) -> usize {
        let message = EventMessage::new(event);
        let event_type = message.event.event_type();
        let booking_id = message.event.booking_id().map(String::from);

        // an error only means nobody is attached
        let reached = self.sender.send(message).unwrap_or(0);
        debug!(event_type, booking_id = ?booking_id, observers = reached, "Ride event published");
        reached
    }

    /// Attach an observer. It sees events published from now on.
    pub fn subscribe(&self) -> RideEventSubscriber {
        RideEventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RideEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer handle; dropping it detaches.
pub struct RideEventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
}

impl RideEventSubscriber {
    /// Next event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    // the next StateChanged carries the full state
                    warn!(missed = count, "Ride event observer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive, for single-threaded hosts
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(missed = count, "Ride event observer lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

/// Shared event bus type
pub type SharedRideEventBus = Arc<RideEventBus>;

/// Create a shared event bus
pub fn create_event_bus() -> SharedRideEventBus {
    Arc::new(RideEventBus::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::events::ActionFailedEvent;
    use chrono::Utc;

    fn failure() -> RideEvent {
        RideEvent::ActionFailed(ActionFailedEvent {
            action: "book_ride".to_string(),
            kind: "validation".to_string(),
            message: "origin required".to_string(),
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn observers_receive_published_events() {
        let bus = RideEventBus::new();
        assert_eq!(bus.publish(failure()), 0);
        let mut subscriber = bus.subscribe();

        assert_eq!(bus.publish(failure()), 1);

        let received = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            subscriber.recv(),
        )
        .await
        .expect("Timeout")
        .expect("No message");

        assert_eq!(received.event.event_type(), "action_failed");
    }

    #[test]
    fn dropped_observers_detach() {
        let bus = RideEventBus::new();
        let first = bus.subscribe();
        let _second = bus.subscribe();
        assert_eq!(bus.observer_count(), 2);

        drop(first);
        assert_eq!(bus.observer_count(), 1);
    }

    #[test]
    fn lagging_observer_skips_to_the_oldest_retained_event() {
        let bus = RideEventBus::with_capacity(2);
        let mut sub = bus.subscribe();
        for _ in 0..5 {
            bus.publish(failure());
        }
        let mut seen = 0;
        while sub.try_recv().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 2);
    }

    #[test]
    fn try_recv_drains_without_blocking() {
        let bus = RideEventBus::new();
        let mut sub = bus.subscribe();
        assert!(sub.try_recv().is_none());
        bus.publish(failure());
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }
}
