//! Live subscriber registry.
//!
//! Connections register on one [`Channel`] when they open and are removed on
//! close or on the first failed delivery. Registration, removal and broadcast
//! may run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::notifier::Channel;

/// Registry key of one subscriber.
pub type SubscriberId = Uuid;

/// Delivery failures. Either one drops the subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriberError {
    #[error("subscriber disconnected")]
    Disconnected,

    #[error("subscriber is not keeping up")]
    Lagging,
}

/// Receiver of serialized broadcast payloads.
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync + 'static {
    async fn send(&self, payload: Arc<str>) -> Result<(), SubscriberError>;
}

/// Subscriber backed by a bounded channel drained by a connection task.
///
/// Never waits: a full queue counts as a failed delivery.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelSubscriber {
    pub fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self { tx }
    }

    /// A subscriber plus the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait::async_trait]
impl Subscriber for ChannelSubscriber {
    async fn send(&self, payload: Arc<str>) -> Result<(), SubscriberError> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubscriberError::Lagging,
            mpsc::error::TrySendError::Closed(_) => SubscriberError::Disconnected,
        })
    }
}

/// Delivery tally of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

struct Entry {
    channel: Channel,
    subscriber: Arc<dyn Subscriber>,
}

/// Shared set of live subscribers.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    subscribers: Arc<RwLock<HashMap<SubscriberId, Entry>>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field(
                "subscribers",
                &self.subscribers.try_read().map(|s| s.len()).unwrap_or(0),
            )
            .finish()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register on the default [`Channel::Devices`] feed.
    pub async fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        self.register_on(Channel::default(), subscriber).await
    }

    pub async fn register_on(
        &self,
        channel: Channel,
        subscriber: Arc<dyn Subscriber>,
    ) -> SubscriberId {
        let id = Uuid::new_v4();
        self.subscribers
            .write()
            .await
            .insert(id, Entry { channel, subscriber });
        tracing::debug!(subscriber = %id, channel = %channel, "Subscriber registered");
        id
    }

    /// Returns whether the subscriber was still registered.
    pub async fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = %id, "Subscriber removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }

    /// Whether anyone is subscribed to `channel`.
    pub async fn has_subscribers(&self, channel: Channel) -> bool {
        self.subscribers
            .read()
            .await
            .values()
            .any(|entry| entry.channel == channel)
    }

    /// Deliver `payload` to every subscriber of `channel`, dropping those
    /// that fail.
    ///
    /// Sends run concurrently outside the lock; one failure never stops
    /// delivery to the rest.
    pub async fn broadcast(&self, channel: Channel, payload: Arc<str>) -> BroadcastReport {
        let targets: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .subscribers
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.channel == channel)
            .map(|(id, entry)| (*id, Arc::clone(&entry.subscriber)))
            .collect();

        let results = futures::future::join_all(targets.iter().map(|(id, sub)| {
            let payload = Arc::clone(&payload);
            async move { (*id, sub.send(payload).await) }
        }))
        .await;

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::debug!(subscriber = %id, error = %e, "Dropping subscriber");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in &failed {
                subscribers.remove(id);
            }
            report.dropped = failed.len();
        }

        report
    }
}
