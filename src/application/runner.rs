//! Single-owner task serializing every call into the lifecycle core
//!
//! REST continuations, push messages and user actions all funnel through
//! one task, so two snapshots can never race on the monotonic check. The
//! same task runs the periodic resync when a poll interval is configured.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::domain::{BookingRequest, ClientRideState, RouteChoice, SyncError};
use crate::notifications::{RideEventSubscriber, SharedRideEventBus};
use crate::shared::ShutdownSignal;

use super::lifecycle::{inbox, BookingLifecycle, LifecycleConfig, LifecycleDeps};

/// Command queue depth
const COMMAND_CAPACITY: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("ride sync task has stopped")]
    Stopped,

    #[error(transparent)]
    Sync(#[from] SyncError),
}

enum Command {
    Start(oneshot::Sender<ClientRideState>),
    Refresh(oneshot::Sender<ClientRideState>),
    Resync(oneshot::Sender<ClientRideState>),
    Book {
        route: RouteChoice,
        request: BookingRequest,
        reply: oneshot::Sender<Result<ClientRideState, SyncError>>,
    },
    Cancel(oneshot::Sender<bool>),
    CompleteFeedback(oneshot::Sender<ClientRideState>),
    State(oneshot::Sender<ClientRideState>),
}

/// Spawns the lifecycle task
pub struct RideSyncRunner;

impl RideSyncRunner {
    /// Spawn the task owning a fresh [`BookingLifecycle`].
    ///
    /// The task stops when `shutdown` triggers or every handle is dropped,
    /// closing the live subscription on the way out.
    pub fn spawn(
        deps: LifecycleDeps,
        config: LifecycleConfig,
        inbox_capacity: usize,
        shutdown: ShutdownSignal,
    ) -> (RideSyncHandle, JoinHandle<()>) {
        let (inbox_tx, mut inbox_rx) = inbox(inbox_capacity);
        let (command_tx, mut command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let events = deps.events.clone();
        let mut poll = config.poll_interval.map(poll_timer);
        let mut lifecycle = BookingLifecycle::new(deps, inbox_tx, config);

        let task = tokio::spawn(async move {
            info!(poll_interval = ?lifecycle.config().poll_interval, "Ride sync task started");

            loop {
                tokio::select! {
                    command = command_rx.recv() => match command {
                        Some(command) => execute(&mut lifecycle, command).await,
                        None => {
                            debug!("All ride sync handles dropped");
                            break;
                        }
                    },
                    Some(message) = inbox_rx.recv() => {
                        lifecycle.handle_message(message).await;
                    }
                    _ = next_poll(&mut poll) => {
                        lifecycle.resync().await;
                    }
                    _ = shutdown.notified().wait() => {
                        info!("Ride sync task received shutdown signal");
                        break;
                    }
                }
            }

            lifecycle.dispose().await;
            info!("Ride sync task stopped");
        });

        (
            RideSyncHandle {
                commands: command_tx,
                events,
            },
            task,
        )
    }
}

fn poll_timer(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(10));
    let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn next_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn execute(lifecycle: &mut BookingLifecycle, command: Command) {
    // a dropped reply receiver only means the caller stopped waiting
    match command {
        Command::Start(reply) => {
            lifecycle.start().await;
            let _ = reply.send(lifecycle.state().clone());
        }
        Command::Refresh(reply) => {
            lifecycle.refresh().await;
            let _ = reply.send(lifecycle.state().clone());
        }
        Command::Resync(reply) => {
            lifecycle.resync().await;
            let _ = reply.send(lifecycle.state().clone());
        }
        Command::Book {
            route,
            request,
            reply,
        } => {
            let result = lifecycle.book_ride(route, request).await;
            let _ = reply.send(result);
        }
        Command::Cancel(reply) => {
            let cancelled = lifecycle.cancel_active().await;
            let _ = reply.send(cancelled);
        }
        Command::CompleteFeedback(reply) => {
            lifecycle.complete_feedback().await;
            let _ = reply.send(lifecycle.state().clone());
        }
        Command::State(reply) => {
            let _ = reply.send(lifecycle.state().clone());
        }
    }
}

/// Cloneable front door to the lifecycle task
#[derive(Clone)]
pub struct RideSyncHandle {
    commands: mpsc::Sender<Command>,
    events: SharedRideEventBus,
}

impl RideSyncHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RunnerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| RunnerError::Stopped)?;
        rx.await.map_err(|_| RunnerError::Stopped)
    }

    /// Restore persisted state, fetch, subscribe.
    pub async fn start(&self) -> Result<ClientRideState, RunnerError> {
        self.request(Command::Start).await
    }

    pub async fn refresh(&self) -> Result<ClientRideState, RunnerError> {
        self.request(Command::Refresh).await
    }

    /// Refresh over REST and reopen a lost live subscription.
    pub async fn resync(&self) -> Result<ClientRideState, RunnerError> {
        self.request(Command::Resync).await
    }

    pub async fn book_ride(
        &self,
        route: RouteChoice,
        request: BookingRequest,
    ) -> Result<ClientRideState, RunnerError> {
        let result = self
            .request(|reply| Command::Book {
                route,
                request,
                reply,
            })
            .await?;
        Ok(result?)
    }

    pub async fn cancel_active(&self) -> Result<bool, RunnerError> {
        self.request(Command::Cancel).await
    }

    pub async fn complete_feedback(&self) -> Result<ClientRideState, RunnerError> {
        self.request(Command::CompleteFeedback).await
    }

    /// Read-only snapshot for rendering
    pub async fn state(&self) -> Result<ClientRideState, RunnerError> {
        self.request(Command::State).await
    }

    /// Attach a change observer
    pub fn subscribe_events(&self) -> RideEventSubscriber {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
