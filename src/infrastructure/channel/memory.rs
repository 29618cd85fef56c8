//! In-process live channel
//!
//! Loops published messages straight back to subscribers. Used by tests
//! and by hosts that feed push updates from somewhere other than a broker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::application::ports::{ChannelMessage, LiveChannel, SubscriptionHandle};
use crate::domain::{SyncError, SyncResult};

/// Subscription lifecycle record, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelActivity {
    Opened(String),
    Closed(String),
}

struct Subscriber {
    handle: SubscriptionHandle,
    sink: mpsc::Sender<ChannelMessage>,
}

/// Topic fan-out held in memory
#[derive(Default)]
pub struct InMemoryChannel {
    topics: DashMap<String, Vec<Subscriber>>,
    offline: AtomicBool,
    activity: Mutex<Vec<ChannelActivity>>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every subscribe attempt fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Deliver `body` to every subscriber of `topic`.
    ///
    /// Returns how many subscribers accepted it; full sinks drop the message.
    pub fn publish(&self, topic: &str, body: impl Into<String>) -> usize {
        let body = body.into();
        let Some(subscribers) = self.topics.get(topic) else {
            debug!(topic, "No subscribers, message discarded");
            return 0;
        };

        let mut delivered = 0;
        for subscriber in subscribers.iter() {
            let message = ChannelMessage {
                subscription: subscriber.handle.id,
                topic: topic.to_string(),
                body: body.clone(),
            };
            match subscriber.sink.try_send(message) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(topic, subscription = %subscriber.handle.id, "Subscriber inbox full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(topic, subscription = %subscriber.handle.id, "Subscriber inbox closed");
                }
            }
        }
        delivered
    }

    /// Drop every subscription as a lost connection would: handles stop
    /// receiving and no close is recorded.
    pub fn sever(&self) {
        self.topics.clear();
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    /// Every open and close so far
    pub fn activity(&self) -> Vec<ChannelActivity> {
        self.activity
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    fn record(&self, entry: ChannelActivity) {
        if let Ok(mut activity) = self.activity.lock() {
            activity.push(entry);
        }
    }
}

#[async_trait]
impl LiveChannel for InMemoryChannel {
    async fn subscribe_topic(
        &self,
        topic: &str,
        sink: mpsc::Sender<ChannelMessage>,
    ) -> SyncResult<SubscriptionHandle> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Network("channel offline".to_string()));
        }

        let handle = SubscriptionHandle::new(topic);
        self.topics
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber {
                handle: handle.clone(),
                sink,
            });
        self.record(ChannelActivity::Opened(topic.to_string()));
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut removed = false;
        if let Some(mut subscribers) = self.topics.get_mut(&handle.topic) {
            let before = subscribers.len();
            subscribers.retain(|s| s.handle.id != handle.id);
            removed = subscribers.len() != before;
        }
        self.topics.remove_if(&handle.topic, |_, s| s.is_empty());

        if removed {
            self.record(ChannelActivity::Closed(handle.topic.clone()));
        }
    }

    async fn is_open(&self, handle: &SubscriptionHandle) -> bool {
        self.topics
            .get(&handle.topic)
            .is_some_and(|s| s.iter().any(|s| s.handle.id == handle.id))
    }
}
