//! Reusable ride tracker runtime.
//!
//! Provides [`TrackerHandle`], which wires the REST client, the STOMP
//! channel, durable storage and the session store into one running
//! [`RideSyncRunner`] and owns its shutdown.

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::{
    LifecycleConfig, LifecycleDeps, RideSyncHandle, RideSyncRunner, RunnerError, SessionStore,
};
use crate::config::AppConfig;
use crate::domain::{BookingId, ClientRideState, SyncError};
use crate::infrastructure::{FileKeyValueStore, HttpBookingApi, KvSessionStore, StompChannel};
use crate::notifications::{create_event_bus, SharedRideEventBus};
use crate::shared::shutdown::{listen_for_shutdown_signals, ShutdownSignal};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the tracker.
pub struct TrackerOptions {
    /// Application configuration.
    pub config: AppConfig,
    /// Restore the persisted ride and follow it right away (default: true).
    pub restore: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            restore: true,
        }
    }
}

// ── TrackerHandle ──────────────────────────────────────────────────

/// Handle to a running ride tracker.
pub struct TrackerHandle {
    /// Front door to the lifecycle task.
    pub rides: RideSyncHandle,
    /// REST client, also used for server-side cancellation.
    pub api: Arc<HttpBookingApi>,
    /// Auth session shared with the lifecycle.
    pub session: Arc<KvSessionStore>,
    /// Event bus the lifecycle publishes to.
    pub events: SharedRideEventBus,
    /// The configuration the tracker was started with.
    pub config: AppConfig,

    channel: Arc<StompChannel>,
    shutdown: ShutdownSignal,
    task: tokio::task::JoinHandle<()>,
}

impl TrackerHandle {
    /// Build every adapter, spawn the lifecycle task and, when
    /// `opts.restore` is set, restore and follow the persisted ride.
    pub async fn start(opts: TrackerOptions) -> Result<Self, TrackerError> {
        let config = opts.config;
        info!(api = %config.api.base_url, ws = %config.channel.ws_url, "Starting ride tracker");

        let api = Arc::new(HttpBookingApi::from_config(&config)?);
        let channel = Arc::new(StompChannel::new(
            config.channel.ws_url.clone(),
            config.connect_timeout(),
        ));
        let store = Arc::new(FileKeyValueStore::open(&config.storage.path));
        let session = Arc::new(KvSessionStore::new(store.clone()));
        let events = create_event_bus();
        info!(path = %store.path().display(), "Storage opened");

        let deps = LifecycleDeps {
            api: api.clone(),
            channel: channel.clone(),
            session: session.clone(),
            store,
            events: events.clone(),
        };
        let lifecycle_config = LifecycleConfig {
            topic_prefix: config.channel.topic_prefix.clone(),
            retry: config.retry_config(),
            poll_interval: config.poll_interval(),
        };

        let shutdown = ShutdownSignal::new();
        let (rides, task) = RideSyncRunner::spawn(
            deps,
            lifecycle_config,
            config.channel.inbox_capacity,
            shutdown.clone(),
        );

        let handle = Self {
            rides,
            api,
            session,
            events,
            config,
            channel,
            shutdown,
            task,
        };

        if opts.restore {
            let state = handle.rides.start().await?;
            info!(status = %state.status, booking_id = ?state.booking_id, "Ride tracker ready");
        }

        Ok(handle)
    }

    /// Cancel the active ride on the server, then drop it locally.
    ///
    /// A booking the server no longer knows, or refuses as invalid, is
    /// dropped locally as well.
    /// Returns `false` when no ride is in progress.
    pub async fn cancel_ride(&self) -> Result<bool, TrackerError> {
        let state = self.rides.state().await?;
        let Some(booking_id) = state.booking_id.filter(|_| state.status.stage() > 0) else {
            return Ok(false);
        };

        let token = self.session.get_auth().token;
        let result = self.api.cancel_booking(&booking_id, token.as_deref()).await;
        settle_server_cancel(&booking_id, result)?;

        Ok(self.rides.cancel_active().await?)
    }

    /// Current reconciled state
    pub async fn state(&self) -> Result<ClientRideState, TrackerError> {
        Ok(self.rides.state().await?)
    }

    /// Get a clone of the shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        tokio::spawn(listen_for_shutdown_signals(self.shutdown.clone()));
    }

    /// Trigger shutdown without waiting.
    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for the tracker to stop after shutdown was triggered.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Ride sync task ended abnormally");
        }
        self.channel.disconnect().await;
        info!("Ride tracker stopped");
    }

    /// Trigger shutdown and wait for everything to stop.
    pub async fn shutdown(self) {
        info!("Shutting down ride tracker");
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Whether a server-side cancel lets the local ride be dropped.
fn settle_server_cancel(booking_id: &BookingId, result: Result<(), SyncError>) -> Result<(), SyncError> {
    match result {
        Ok(()) => Ok(()),
        Err(SyncError::NotFound(_)) => {
            warn!(booking_id = %booking_id, "Booking unknown to server, clearing locally");
            Ok(())
        }
        Err(SyncError::Validation(reason)) => {
            warn!(booking_id = %booking_id, reason = %reason, "Server rejected booking id, clearing locally");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Initialise tracing from the logging section. `RUST_LOG` wins when set.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.api.base_url = "http://127.0.0.1:1".into();
        config.api.request_timeout_secs = 2;
        config.channel.ws_url = "ws://127.0.0.1:1/ws/websocket".into();
        config.channel.connect_timeout_secs = 2;
        config.retry.max_attempts = 1;
        config.storage.path = std::env::temp_dir()
            .join(format!("ride-tracker-{}", uuid::Uuid::new_v4()))
            .join("state.json");
        config
    }

    #[test]
    fn refused_or_unknown_ids_are_cleared_locally() {
        let id = BookingId::from("abc");
        assert_eq!(settle_server_cancel(&id, Ok(())), Ok(()));
        assert_eq!(
            settle_server_cancel(&id, Err(SyncError::NotFound("abc".into()))),
            Ok(())
        );
        assert_eq!(
            settle_server_cancel(&id, Err(SyncError::Validation("Bad Request".into()))),
            Ok(())
        );
        assert!(settle_server_cancel(&id, Err(SyncError::Network("refused".into()))).is_err());
        assert!(settle_server_cancel(&id, Err(SyncError::Unauthorized("expired".into()))).is_err());
    }

    #[tokio::test]
    async fn starts_idle_without_persisted_ride_and_shuts_down() {
        let config = offline_config();
        let dir = config.storage.path.parent().map(|p| p.to_path_buf());
        let handle = TrackerHandle::start(TrackerOptions {
            config,
            restore: true,
        })
        .await
        .unwrap();

        assert!(handle.is_running());
        assert_eq!(handle.state().await.unwrap(), ClientRideState::default());
        assert!(!handle.cancel_ride().await.unwrap());

        tokio::time::timeout(std::time::Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();
        if let Some(dir) = dir {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
