//! Periodic per-channel broadcast.

use std::sync::Arc;
use std::time::Duration;

use strum::IntoEnumIterator;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::lifecycle::{LoopHandle, shutdown_requested};
use crate::notifier::{
    BroadcastMessage, BroadcastReport, Channel, RECENT_ALERTS_LIMIT, SubscriberRegistry,
};
use crate::storage::{StateStore, StorageError};

/// Errors of one broadcast pass. The loop logs them and carries on.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Shortest accepted broadcast interval; a zero period cannot drive a ticker.
pub const MIN_BROADCAST_INTERVAL: Duration = Duration::from_millis(1);

/// Pushes current fleet state to every subscribed channel on a fixed interval.
pub struct ChangeNotifier {
    store: Arc<dyn StateStore>,
    registry: SubscriberRegistry,
    interval: Duration,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("interval", &self.interval)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ChangeNotifier {
    /// `interval` is raised to [`MIN_BROADCAST_INTERVAL`] if shorter.
    pub fn new(store: Arc<dyn StateStore>, registry: SubscriberRegistry, interval: Duration) -> Self {
        Self {
            store,
            registry,
            interval: interval.max(MIN_BROADCAST_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One pass: for each channel with subscribers, read, encode once, fan out.
    ///
    /// Skips the store entirely when nobody is listening.
    pub async fn broadcast_once(&self) -> Result<BroadcastReport, NotifierError> {
        let mut report = BroadcastReport::default();
        if self.registry.is_empty().await {
            return Ok(report);
        }

        for channel in Channel::iter() {
            if !self.registry.has_subscribers(channel).await {
                continue;
            }
            let payload = self.message(channel).await?.encode()?;
            let sent = self.registry.broadcast(channel, payload).await;
            report.delivered += sent.delivered;
            report.dropped += sent.dropped;
        }
        Ok(report)
    }

    async fn message(&self, channel: Channel) -> Result<BroadcastMessage, StorageError> {
        Ok(match channel {
            Channel::Devices => BroadcastMessage::DeviceUpdate(self.store.snapshot().await?),
            Channel::Stats => BroadcastMessage::Stats(self.store.latest_samples().await?),
            Channel::Alerts => {
                BroadcastMessage::Alerts(self.store.recent_alerts(RECENT_ALERTS_LIMIT).await?)
            }
            Channel::Topology => BroadcastMessage::Topology(self.store.list_links().await?),
        })
    }

    /// Start the loop on the runtime.
    pub fn spawn(self) -> LoopHandle {
        LoopHandle::spawn("change-notifier", move |shutdown| self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval = ?self.interval, "Change notifier started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }

            match self.broadcast_once().await {
                Ok(report) if report.dropped > 0 => tracing::debug!(
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "Broadcast dropped subscribers"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Broadcast failed"),
            }
        }

        tracing::info!("Change notifier stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ChannelSubscriber;
    use crate::storage::{
        AlertKind, DeviceCycle, InterfaceObservation, LinkObservation, NewAlert, OperStatus,
    };
    use crate::testing::{memory_store, seed_device};
    use chrono::Utc;

    #[tokio::test]
    async fn test_broadcast_once_without_subscribers_is_noop() {
        let store = Arc::new(memory_store().await);
        seed_device(&store, "core-1", "10.0.0.1").await;
        let notifier = ChangeNotifier::new(store, SubscriberRegistry::new(), Duration::from_secs(1));
        assert_eq!(notifier.broadcast_once().await.unwrap(), BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_broadcast_once_sends_snapshot() {
        let store = Arc::new(memory_store().await);
        let id = seed_device(&store, "core-1", "10.0.0.1").await;
        let mut cycle = DeviceCycle::reachable(id, Utc::now());
        cycle.interfaces.push(InterfaceObservation {
            name: "eth0".into(),
            status: OperStatus::Up,
            mac_address: None,
            speed_bps: Some(12800),
            in_bps: 12800,
            out_bps: 0,
        });
        store.commit_cycle(&cycle).await.unwrap();

        let registry = SubscriberRegistry::new();
        let (subscriber, mut rx) = ChannelSubscriber::channel(4);
        registry.register(Arc::new(subscriber)).await;

        let notifier = ChangeNotifier::new(store, registry, Duration::from_secs(1));
        let report = notifier.broadcast_once().await.unwrap();
        assert_eq!(report.delivered, 1);

        let payload = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "device_update");
        assert_eq!(value["data"][0]["hostname"], "core-1");
        assert_eq!(value["data"][0]["status"], "up");
        assert_eq!(value["data"][0]["interfaces"][0]["speed_bps"], 12800);
    }

    #[tokio::test]
    async fn test_each_channel_gets_its_own_payload() {
        let store = Arc::new(memory_store().await);
        let core = seed_device(&store, "core-1", "10.0.0.1").await;
        let edge = seed_device(&store, "edge-1", "10.0.0.2").await;

        let mut cycle = DeviceCycle::reachable(core, Utc::now());
        cycle.interfaces.push(InterfaceObservation {
            name: "eth0".into(),
            status: OperStatus::Up,
            mac_address: None,
            speed_bps: Some(12800),
            in_bps: 12800,
            out_bps: 6400,
        });
        cycle.links.push(LinkObservation {
            src_interface: "eth0".into(),
            dst_device_id: edge,
            dst_interface: "Gi0/1".into(),
        });
        cycle.alerts.push(NewAlert::device(
            AlertKind::DeviceUp,
            "Device core-1 (10.0.0.1) is reachable",
        ));
        store.commit_cycle(&cycle).await.unwrap();

        let registry = SubscriberRegistry::new();
        let mut receivers = Vec::new();
        for channel in [Channel::Stats, Channel::Alerts, Channel::Topology] {
            let (subscriber, rx) = ChannelSubscriber::channel(4);
            registry.register_on(channel, Arc::new(subscriber)).await;
            receivers.push(rx);
        }

        let notifier = ChangeNotifier::new(store, registry, Duration::from_secs(1));
        let report = notifier.broadcast_once().await.unwrap();
        assert_eq!(report.delivered, 3);

        let mut messages = Vec::new();
        for rx in &mut receivers {
            let payload = rx.recv().await.unwrap();
            messages.push(serde_json::from_str::<serde_json::Value>(&payload).unwrap());
            // One message per pass, on its own channel only.
            assert!(rx.try_recv().is_err());
        }

        assert_eq!(messages[0]["type"], "stats");
        assert_eq!(messages[0]["data"][0]["interface"]["name"], "eth0");
        assert_eq!(messages[0]["data"][0]["stats"]["in_bps"], 12800);
        assert_eq!(messages[1]["type"], "alerts");
        assert_eq!(messages[1]["data"][0]["kind"], "device_up");
        assert_eq!(messages[2]["type"], "topology");
        assert_eq!(messages[2]["data"][0]["dst_interface"], "Gi0/1");
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let store = Arc::new(memory_store().await);
        let notifier = ChangeNotifier::new(store, SubscriberRegistry::new(), Duration::ZERO);
        assert_eq!(notifier.interval(), MIN_BROADCAST_INTERVAL);

        let handle = notifier.spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        assert_eq!(
            handle.shutdown().await,
            crate::lifecycle::ShutdownOutcome::Graceful
        );
    }

    #[tokio::test]
    async fn test_loop_delivers_and_stops() {
        let store = Arc::new(memory_store().await);
        seed_device(&store, "core-1", "10.0.0.1").await;

        let registry = SubscriberRegistry::new();
        let (subscriber, mut rx) = ChannelSubscriber::channel(4);
        registry.register(Arc::new(subscriber)).await;

        let handle =
            ChangeNotifier::new(store, registry.clone(), Duration::from_millis(20)).spawn();
        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert!(first.is_some());

        // A subscriber that stops draining is eventually dropped.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(registry.is_empty().await);

        assert_eq!(
            handle.shutdown().await,
            crate::lifecycle::ShutdownOutcome::Graceful
        );
    }
}
