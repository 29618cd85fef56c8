//! Outbound ports for REST and live-channel collaborators
//!
//! [`BookingApi`] is the request/response contract against the fleet API;
//! [`LiveChannel`] is the publish-subscribe contract used for push updates.
//! Both surface failures as [`SyncError`] and never panic on transport
//! problems.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{BookingId, BookingRequest, BookingSnapshot, SyncResult};

// ── BookingApi ─────────────────────────────────────────────────

/// Authenticated request/response exchange against the fleet API.
#[async_trait]
pub trait BookingApi: Send + Sync {
    /// Fetch the current snapshot of a booking.
    ///
    /// Fails with `NotFound` when the id no longer exists, `Network` when
    /// the server is unreachable.
    async fn fetch_snapshot(
        &self,
        booking_id: &BookingId,
        token: Option<&str>,
    ) -> SyncResult<BookingSnapshot>;

    /// Create a booking.
    ///
    /// Fails with `Validation` when the server rejects the payload.
    async fn create_booking(
        &self,
        request: &BookingRequest,
        token: Option<&str>,
    ) -> SyncResult<BookingSnapshot>;
}

// ── LiveChannel ────────────────────────────────────────────────

/// Handle to one open topic subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: Uuid,
    pub topic: String,
}

impl SubscriptionHandle {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
        }
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.topic, self.id)
    }
}

/// Inbound message, tagged with the subscription that delivered it.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub subscription: Uuid,
    pub topic: String,
    pub body: String,
}

/// Publish-subscribe connection to named topics.
#[async_trait]
pub trait LiveChannel: Send + Sync {
    /// Open a subscription to `topic`; every inbound message is pushed into
    /// `sink`. The sink is bounded: implementations drop a message rather
    /// than block when it is full.
    async fn subscribe_topic(
        &self,
        topic: &str,
        sink: mpsc::Sender<ChannelMessage>,
    ) -> SyncResult<SubscriptionHandle>;

    /// Close a subscription. Closing an unknown or already-closed handle is a no-op.
    async fn unsubscribe(&self, handle: &SubscriptionHandle);

    /// Whether `handle` still receives messages. False once the underlying
    /// connection dropped or the handle was closed.
    async fn is_open(&self, handle: &SubscriptionHandle) -> bool;
}
