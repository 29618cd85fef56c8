//! Booking lifecycle core
//!
//! Owns the client-side view of the single active booking. Three inputs
//! flow through one reconciliation step:
//!
//! - REST snapshots (`refresh`, `book_ride`)
//! - push messages from the live channel (`handle_message`)
//! - restart state restored from durable storage (`start` / `initialize`)
//!
//! The core exclusively owns the live-channel subscription for the active
//! booking id and is the sole writer of the two persisted restart keys.
//! Every method takes `&mut self`; hosts on a multi-threaded runtime wrap
//! the core in [`RideSyncRunner`](super::runner::RideSyncRunner).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{
    reconcile, BookingId, BookingRequest, BookingSnapshot, ClientRideState, ClientRideStatus,
    RideFlags, RouteChoice, SyncError, SyncResult, Transition,
};
use crate::notifications::{
    ActionFailedEvent, ChannelErrorEvent, RideEvent, SharedRideEventBus, StateChangedEvent,
};
use crate::shared::{retry_with_backoff, RetryConfig};

use super::ports::{
    BookingApi, ChannelMessage, KeyValueStore, LiveChannel, SessionStore, SubscriptionHandle,
};

/// Storage key for the active booking id
pub const ACTIVE_BOOKING_KEY: &str = "activeBookingId";
/// Storage key for the serialized active route
pub const ACTIVE_ROUTE_KEY: &str = "activeRoute";

/// Default capacity of the push inbox
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// Create the bounded push queue feeding the core.
pub fn inbox(
    capacity: usize,
) -> (
    mpsc::Sender<ChannelMessage>,
    mpsc::Receiver<ChannelMessage>,
) {
    mpsc::channel(capacity.max(1))
}

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Fetch,
    Push,
    Create,
    Manual,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Push => "push",
            Self::Create => "create",
            Self::Manual => "manual",
        }
    }
}

/// Core settings
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Topic prefix; the booking id is appended
    pub topic_prefix: String,
    /// Retry policy for snapshot fetches
    pub retry: RetryConfig,
    /// Period of the background [`resync`](BookingLifecycle::resync); `None` disables it
    pub poll_interval: Option<Duration>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "/topic/bookings/".to_string(),
            retry: RetryConfig::default(),
            poll_interval: None,
        }
    }
}

/// Collaborators injected into the core
#[derive(Clone)]
pub struct LifecycleDeps {
    pub api: Arc<dyn BookingApi>,
    pub channel: Arc<dyn LiveChannel>,
    pub session: Arc<dyn SessionStore>,
    pub store: Arc<dyn KeyValueStore>,
    pub events: SharedRideEventBus,
}

#[derive(Debug, Clone)]
struct ActiveSubscription {
    booking_id: BookingId,
    handle: SubscriptionHandle,
}

/// Client-side lifecycle of the single active booking
pub struct BookingLifecycle {
    deps: LifecycleDeps,
    config: LifecycleConfig,
    inbox: mpsc::Sender<ChannelMessage>,
    state: ClientRideState,
    subscription: Option<ActiveSubscription>,
}

impl BookingLifecycle {
    /// `inbox` is the sending half handed to every live-channel subscription;
    /// the host drains the receiving half into [`handle_message`](Self::handle_message).
    pub fn new(
        deps: LifecycleDeps,
        inbox: mpsc::Sender<ChannelMessage>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            deps,
            config,
            inbox,
            state: ClientRideState::default(),
            subscription: None,
        }
    }

    // ── Read side ──────────────────────────────────────────

    /// Read-only snapshot for rendering
    pub fn state(&self) -> &ClientRideState {
        &self.state
    }

    pub fn flags(&self) -> RideFlags {
        self.state.flags()
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn events(&self) -> &SharedRideEventBus {
        &self.deps.events
    }

    /// Currently open subscription, if any
    pub fn subscription(&self) -> Option<&SubscriptionHandle> {
        self.subscription.as_ref().map(|s| &s.handle)
    }

    pub fn topic_for(&self, booking_id: &BookingId) -> String {
        format!("{}{}", self.config.topic_prefix, booking_id)
    }

    // ── Mount ──────────────────────────────────────────────

    /// Read the restart state. Absent or malformed entries read as `None`.
    pub fn load_persisted(&self) -> (Option<BookingId>, Option<RouteChoice>) {
        let booking_id = match self.deps.store.get(ACTIVE_BOOKING_KEY) {
            Ok(raw) => raw.as_deref().and_then(BookingId::parse),
            Err(e) => {
                warn!(error = %e, "Persisted booking id unreadable, starting idle");
                None
            }
        };

        let route = match self.deps.store.get(ACTIVE_ROUTE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<RouteChoice>(&raw) {
                Ok(route) => Some(route),
                Err(e) => {
                    warn!(error = %e, "Persisted route malformed, ignoring it");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Persisted route unreadable, ignoring it");
                None
            }
        };

        (booking_id, route)
    }

    /// Expose a provisional `BOOKED` state for a restored booking before
    /// any network confirmation. Never fails.
    pub fn initialize(
        &mut self,
        persisted_id: Option<BookingId>,
        persisted_route: Option<RouteChoice>,
    ) {
        let Some(booking_id) = persisted_id else {
            if persisted_route.is_some() {
                debug!("Dropping persisted route without a booking id");
                self.clear_persisted();
            }
            return;
        };

        if self.state.booking_id.is_some() {
            debug!(booking_id = %booking_id, "Booking already active, skipping restore");
            return;
        }

        info!(booking_id = %booking_id, "Restoring active booking");
        let previous = self.state.status;
        self.state = ClientRideState::booked(booking_id, persisted_route);
        self.publish_state(previous);
    }

    /// Restore from storage, fetch the current snapshot, then open the
    /// live subscription.
    pub async fn start(&mut self) {
        let (booking_id, route) = self.load_persisted();
        self.initialize(booking_id, route);

        let Some(booking_id) = self.state.booking_id.clone() else {
            return;
        };

        self.refresh().await;

        // the fetch may have closed the ride
        if self.state.booking_id.as_ref() == Some(&booking_id) {
            self.subscribe(&booking_id).await;
        }
    }

    /// Close the subscription, keeping the restart state for the next mount.
    pub async fn dispose(&mut self) {
        self.unsubscribe().await;
    }

    // ── Reconciliation ─────────────────────────────────────

    /// Merge a snapshot into the current state and return it.
    pub async fn reconcile(&mut self, snapshot: &BookingSnapshot) -> &ClientRideState {
        self.apply_snapshot(snapshot, SnapshotSource::Manual).await;
        &self.state
    }

    /// Merge a snapshot from `source` into the current state.
    ///
    /// Snapshots for a booking other than the active one are dropped.
    pub async fn apply_snapshot(
        &mut self,
        snapshot: &BookingSnapshot,
        source: SnapshotSource,
    ) -> Transition {
        match &self.state.booking_id {
            Some(active) if *active == snapshot.id => {}
            Some(active) => {
                debug!(
                    active = %active,
                    booking_id = %snapshot.id,
                    source = source.as_str(),
                    "Dropping snapshot for another booking"
                );
                record_dropped("stale_booking");
                return Transition::Unchanged;
            }
            None => {
                debug!(booking_id = %snapshot.id, source = source.as_str(), "No active booking, dropping snapshot");
                record_dropped("no_active_booking");
                return Transition::Unchanged;
            }
        }

        let result = reconcile(&self.state, snapshot);
        metrics::counter!(
            "ride_sync_snapshots_total",
            "source" => source.as_str(),
            "outcome" => result.transition.as_str()
        )
        .increment(1);

        match result.transition {
            Transition::Cancelled => {
                info!(booking_id = %snapshot.id, source = source.as_str(), "Booking cancelled");
                self.clear_active().await;
            }
            Transition::Unchanged => {
                debug!(
                    booking_id = %snapshot.id,
                    server_status = %snapshot.status,
                    status = %self.state.status,
                    source = source.as_str(),
                    "Snapshot does not advance status"
                );
                self.replace_state(result.state);
            }
            transition => {
                info!(
                    booking_id = %snapshot.id,
                    server_status = %snapshot.status,
                    from = %self.state.status,
                    to = %result.state.status,
                    source = source.as_str(),
                    "Ride status {}",
                    transition.as_str()
                );
                self.replace_state(result.state);
            }
        }

        result.transition
    }

    /// Route one push message through reconciliation.
    ///
    /// Messages from a subscription that is no longer open are dropped, as
    /// are payloads that do not decode as a booking snapshot.
    pub async fn handle_message(&mut self, message: ChannelMessage) {
        let current = self.subscription.as_ref().map(|s| s.handle.id);
        if current != Some(message.subscription) {
            debug!(topic = %message.topic, "Dropping message from closed subscription");
            record_dropped("stale_subscription");
            return;
        }

        let snapshot = match BookingSnapshot::from_json(&message.body) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let err = SyncError::from(e);
                warn!(topic = %message.topic, error = %err, "Dropping malformed push message");
                record_dropped("malformed");
                return;
            }
        };

        self.apply_snapshot(&snapshot, SnapshotSource::Push).await;
    }

    /// Fetch the active booking's snapshot and reconcile it.
    ///
    /// Network failures keep the last known state. `NotFound` closes the
    /// ride, as does `Validation`: the server refuses the id itself.
    pub async fn refresh(&mut self) -> Option<Transition> {
        let booking_id = self.state.booking_id.clone()?;
        let token = self.deps.session.get_auth().token;
        let api = self.deps.api.clone();

        let result = retry_with_backoff(
            &self.config.retry,
            || api.fetch_snapshot(&booking_id, token.as_deref()),
            SyncError::is_transient,
            "fetch_snapshot",
        )
        .await;

        match result {
            Ok(snapshot) => Some(self.apply_snapshot(&snapshot, SnapshotSource::Fetch).await),
            Err(SyncError::NotFound(_)) => {
                info!(booking_id = %booking_id, "Booking no longer exists, closing ride");
                self.clear_active().await;
                Some(Transition::Cancelled)
            }
            Err(SyncError::Validation(reason)) => {
                warn!(booking_id = %booking_id, reason = %reason, "Server rejected booking id, closing ride");
                self.clear_active().await;
                Some(Transition::Cancelled)
            }
            Err(e) => {
                warn!(booking_id = %booking_id, error = %e, "Snapshot fetch failed, keeping last known state");
                None
            }
        }
    }

    /// Degraded-mode catch-up: refresh the active booking over REST, then
    /// reopen its live subscription if the channel lost it or never had it.
    pub async fn resync(&mut self) {
        let Some(booking_id) = self.state.booking_id.clone() else {
            return;
        };

        self.refresh().await;
        if self.state.booking_id.as_ref() != Some(&booking_id) {
            return;
        }

        if let Some(active) = &self.subscription {
            if self.deps.channel.is_open(&active.handle).await {
                return;
            }
            warn!(booking_id = %booking_id, topic = %active.handle.topic, "Live subscription lost, reopening");
            metrics::counter!("ride_sync_subscriptions_total", "op" => "lost").increment(1);
            self.unsubscribe().await;
        }
        self.subscribe(&booking_id).await;
    }

    // ── Subscription lifetime ──────────────────────────────

    /// Open the live subscription for `booking_id`.
    ///
    /// A no-op when that booking is already subscribed; a different booking's
    /// subscription is closed first. Failures are published as
    /// [`RideEvent::ChannelError`] and return `None`.
    pub async fn subscribe(&mut self, booking_id: &BookingId) -> Option<SubscriptionHandle> {
        if let Some(active) = &self.subscription {
            if active.booking_id == *booking_id {
                debug!(booking_id = %booking_id, "Already subscribed");
                return Some(active.handle.clone());
            }
            self.unsubscribe().await;
        }

        let topic = self.topic_for(booking_id);
        match self
            .deps
            .channel
            .subscribe_topic(&topic, self.inbox.clone())
            .await
        {
            Ok(handle) => {
                info!(booking_id = %booking_id, topic = %topic, "Live subscription opened");
                metrics::counter!("ride_sync_subscriptions_total", "op" => "open").increment(1);
                self.subscription = Some(ActiveSubscription {
                    booking_id: booking_id.clone(),
                    handle: handle.clone(),
                });
                Some(handle)
            }
            Err(e) => {
                warn!(booking_id = %booking_id, topic = %topic, error = %e, "Live subscription failed, relying on refresh");
                metrics::counter!("ride_sync_subscriptions_total", "op" => "failed").increment(1);
                self.deps
                    .events
                    .publish(RideEvent::ChannelError(ChannelErrorEvent {
                        booking_id: booking_id.to_string(),
                        topic,
                        message: e.to_string(),
                        timestamp: Utc::now(),
                    }));
                None
            }
        }
    }

    /// Close the open subscription. Safe to call at any time.
    pub async fn unsubscribe(&mut self) {
        if let Some(active) = self.subscription.take() {
            self.deps.channel.unsubscribe(&active.handle).await;
            info!(booking_id = %active.booking_id, topic = %active.handle.topic, "Live subscription closed");
            metrics::counter!("ride_sync_subscriptions_total", "op" => "close").increment(1);
        }
    }

    // ── User actions ───────────────────────────────────────

    /// Create a booking for `route` and start tracking it.
    ///
    /// Failures are returned and also published as a one-shot
    /// [`RideEvent::ActionFailed`]. A rejected token clears the session.
    pub async fn book_ride(
        &mut self,
        route: RouteChoice,
        mut request: BookingRequest,
    ) -> SyncResult<ClientRideState> {
        let auth = self.deps.session.get_auth();
        if !auth.is_authenticated() {
            let err = SyncError::Unauthorized("sign in to book a ride".to_string());
            self.publish_failure("book_ride", &err);
            return Err(err);
        }
        if request.customer_id.is_none() {
            request.customer_id = auth.user.as_ref().map(|u| u.id);
        }

        let snapshot = match self
            .deps
            .api
            .create_booking(&request, auth.token.as_deref())
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Booking creation failed");
                if matches!(e, SyncError::Unauthorized(_)) {
                    self.deps.session.clear_auth();
                }
                self.publish_failure("book_ride", &e);
                return Err(e);
            }
        };

        // at most one active booking per session
        if self.state != ClientRideState::default() || self.subscription.is_some() {
            info!(booking_id = ?self.state.booking_id, "Replacing previous booking");
            self.clear_active().await;
        }

        let booking_id = snapshot.id.clone();
        info!(booking_id = %booking_id, route = %route.kind, "Booking created");

        let previous = self.state.status;
        self.state = ClientRideState::booked(booking_id.clone(), Some(route));
        self.persist();
        self.publish_state(previous);

        self.subscribe(&booking_id).await;
        self.apply_snapshot(&snapshot, SnapshotSource::Create).await;

        Ok(self.state.clone())
    }

    /// Drop the active ride locally. The server must already have been told.
    ///
    /// Returns `false` when there is no ride in progress.
    pub async fn cancel_active(&mut self) -> bool {
        if self.state.status == ClientRideStatus::Idle {
            debug!("Nothing to cancel");
            return false;
        }
        info!(booking_id = ?self.state.booking_id, "Cancelling active ride locally");
        self.clear_active().await;
        true
    }

    /// Close the ride after the feedback prompt was submitted or discarded.
    pub async fn complete_feedback(&mut self) {
        info!(booking_id = ?self.state.booking_id, "Feedback done, closing ride");
        self.clear_active().await;
    }

    // ── Internals ──────────────────────────────────────────

    async fn clear_active(&mut self) {
        self.unsubscribe().await;
        self.clear_persisted();
        self.replace_state(ClientRideState::default());
    }

    fn replace_state(&mut self, next: ClientRideState) {
        if next == self.state {
            return;
        }
        let previous = self.state.status;
        self.state = next;
        self.publish_state(previous);
    }

    fn publish_state(&self, previous_status: ClientRideStatus) {
        self.deps
            .events
            .publish(RideEvent::StateChanged(StateChangedEvent {
                previous_status,
                state: self.state.clone(),
                timestamp: Utc::now(),
            }));
    }

    fn publish_failure(&self, action: &str, err: &SyncError) {
        self.deps
            .events
            .publish(RideEvent::ActionFailed(ActionFailedEvent {
                action: action.to_string(),
                kind: err.kind().to_string(),
                message: err.to_string(),
                timestamp: Utc::now(),
            }));
    }

    fn persist(&self) {
        let Some(booking_id) = &self.state.booking_id else {
            return;
        };
        if let Err(e) = self.deps.store.set(ACTIVE_BOOKING_KEY, booking_id.as_str()) {
            warn!(error = %e, "Failed to persist active booking id");
        }
        if let Some(route) = &self.state.active_route {
            match serde_json::to_string(route) {
                Ok(raw) => {
                    if let Err(e) = self.deps.store.set(ACTIVE_ROUTE_KEY, &raw) {
                        warn!(error = %e, "Failed to persist active route");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode active route"),
            }
        }
    }

    fn clear_persisted(&self) {
        for key in [ACTIVE_BOOKING_KEY, ACTIVE_ROUTE_KEY] {
            if let Err(e) = self.deps.store.remove(key) {
                warn!(key, error = %e, "Failed to clear persisted ride state");
            }
        }
    }
}

fn record_dropped(reason: &'static str) {
    metrics::counter!("ride_sync_messages_dropped_total", "reason" => reason).increment(1);
}
