//! Fakes for the application ports

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{
    BookingId, BookingRequest, BookingSnapshot, GeoPoint, RouteChoice, SyncError, SyncResult,
    UserProfile, UserRole,
};
use crate::infrastructure::{InMemoryChannel, InMemoryKeyValueStore, KvSessionStore};
use crate::notifications::{create_event_bus, SharedRideEventBus};
use crate::shared::RetryConfig;

use super::lifecycle::{inbox, BookingLifecycle, LifecycleConfig, LifecycleDeps};
use super::ports::{BookingApi, ChannelMessage, KeyValueStore, SessionStore};

/// Scripted booking API
#[derive(Default)]
pub struct FakeBookingApi {
    snapshots: Mutex<HashMap<String, SyncResult<BookingSnapshot>>>,
    queued: Mutex<HashMap<String, VecDeque<SyncResult<BookingSnapshot>>>>,
    create: Mutex<Option<SyncResult<BookingSnapshot>>>,
    last_request: Mutex<Option<BookingRequest>>,
    fetch_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl FakeBookingApi {
    pub fn set_snapshot(&self, id: &str, result: SyncResult<BookingSnapshot>) {
        self.snapshots.lock().unwrap().insert(id.to_string(), result);
    }

    /// Answer the next fetch for `id` with `result`, ahead of the standing one.
    pub fn queue_snapshot(&self, id: &str, result: SyncResult<BookingSnapshot>) {
        self.queued
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn set_create(&self, result: SyncResult<BookingSnapshot>) {
        *self.create.lock().unwrap() = Some(result);
    }

    pub fn last_request(&self) -> Option<BookingRequest> {
        self.last_request.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BookingApi for FakeBookingApi {
    async fn fetch_snapshot(
        &self,
        booking_id: &BookingId,
        _token: Option<&str>,
    ) -> SyncResult<BookingSnapshot> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(booking_id.as_str())
            .and_then(VecDeque::pop_front);
        if let Some(result) = queued {
            return result;
        }
        self.snapshots
            .lock()
            .unwrap()
            .get(booking_id.as_str())
            .cloned()
            .unwrap_or_else(|| Err(SyncError::NotFound(booking_id.to_string())))
    }

    async fn create_booking(
        &self,
        request: &BookingRequest,
        _token: Option<&str>,
    ) -> SyncResult<BookingSnapshot> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.create
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(SyncError::Network("no scripted response".into())))
    }
}

/// Storage that fails every call
pub struct BrokenStore;

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> SyncResult<Option<String>> {
        Err(SyncError::Storage("disk unavailable".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> SyncResult<()> {
        Err(SyncError::Storage("disk unavailable".into()))
    }

    fn remove(&self, _key: &str) -> SyncResult<()> {
        Err(SyncError::Storage("disk unavailable".into()))
    }
}

pub fn customer() -> UserProfile {
    UserProfile {
        id: 7,
        name: Some("Meera".into()),
        email: Some("meera@example.com".into()),
        role: UserRole::Customer,
    }
}

pub fn fastest_route() -> RouteChoice {
    RouteChoice {
        kind: "fastest".into(),
        distance: Some("12.4 km".into()),
        estimated_time: Some("24 min".into()),
        price: Some(310.0),
        coordinates: vec![GeoPoint::new(12.97, 77.59), GeoPoint::new(13.03, 77.63)],
    }
}

pub fn booking_request() -> BookingRequest {
    BookingRequest::new("MG Road", "Hebbal", "SEDAN")
}

/// Every collaborator wired to an in-memory fake
pub struct Harness {
    pub api: Arc<FakeBookingApi>,
    pub channel: Arc<InMemoryChannel>,
    pub store: Arc<InMemoryKeyValueStore>,
    pub session: Arc<KvSessionStore>,
    pub events: SharedRideEventBus,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(InMemoryKeyValueStore::new())
    }

    pub fn with_store(store: InMemoryKeyValueStore) -> Self {
        let store = Arc::new(store);
        Self {
            api: Arc::new(FakeBookingApi::default()),
            channel: Arc::new(InMemoryChannel::new()),
            session: Arc::new(KvSessionStore::new(store.clone())),
            store,
            events: create_event_bus(),
        }
    }

    pub fn signed_in(self) -> Self {
        self.session.save_auth("jwt-token", &customer()).unwrap();
        self
    }

    pub fn deps(&self) -> LifecycleDeps {
        LifecycleDeps {
            api: self.api.clone(),
            channel: self.channel.clone(),
            session: self.session.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
        }
    }

    pub fn config() -> LifecycleConfig {
        LifecycleConfig {
            retry: RetryConfig::none(),
            ..LifecycleConfig::default()
        }
    }

    pub fn lifecycle(&self) -> (BookingLifecycle, mpsc::Receiver<ChannelMessage>) {
        let (tx, rx) = inbox(16);
        (BookingLifecycle::new(self.deps(), tx, Self::config()), rx)
    }
}

/// Feed every queued push message into the core.
pub async fn pump(lifecycle: &mut BookingLifecycle, rx: &mut mpsc::Receiver<ChannelMessage>) {
    while let Ok(message) = rx.try_recv() {
        lifecycle.handle_message(message).await;
    }
}
