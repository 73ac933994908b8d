//! One device, one cycle: scan, reconcile, discover, commit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::poller::PollError;
use crate::poller::interface::{InterfacePoller, reconcile};
use crate::poller::topology::TopologyDiscoverer;
use crate::snmp::{ProtocolClient, Target};
use crate::storage::{
    AlertKind, CommitSummary, Device, DeviceCycle, NewAlert, OperStatus, StateStore,
};

/// What a device poll observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The agent answered; the cycle was committed.
    Reachable(CommitSummary),
    /// The interface scan failed; the device was recorded as down.
    Unreachable,
}

/// Polls a single device and commits its cycle atomically.
#[derive(Clone)]
pub struct DevicePoller {
    interfaces: InterfacePoller,
    topology: TopologyDiscoverer,
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for DevicePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePoller")
            .field("interval", &self.interfaces.interval())
            .finish_non_exhaustive()
    }
}

impl DevicePoller {
    /// `interval` is the rate window used to turn octet counts into bps.
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        store: Arc<dyn StateStore>,
        interval: Duration,
    ) -> Self {
        Self {
            interfaces: InterfacePoller::new(Arc::clone(&client), interval),
            topology: TopologyDiscoverer::new(client, Arc::clone(&store)),
            store,
        }
    }

    /// Poll `device` once.
    ///
    /// An unreachable agent is a valid observation and returns `Ok`. Errors
    /// mean the cycle could not be read or committed and nothing was written.
    pub async fn poll(&self, device: &Device) -> Result<PollOutcome, PollError> {
        let target = Target::new(&device.ip_address, &device.community);
        let observed_at = Utc::now();

        let tables = match self.interfaces.fetch(&target).await {
            Ok(tables) => tables,
            Err(e) => {
                tracing::warn!(device = %device.hostname, ip = %device.ip_address, error = %e, "Device unreachable");
                let mut cycle = DeviceCycle::unreachable(device.id, observed_at);
                cycle.alerts.extend(device_alert(device, OperStatus::Down));
                self.store.commit_cycle(&cycle).await?;
                return Ok(PollOutcome::Unreachable);
            }
        };

        let known = self.store.interfaces_for_device(device.id).await?;
        let readings = self.interfaces.readings(&tables);
        let reconciled = reconcile(&device.hostname, &readings, &known);
        let links = self.topology.discover(device, &target, &tables.names).await?;

        let mut cycle = DeviceCycle::reachable(device.id, observed_at);
        cycle.alerts.extend(device_alert(device, OperStatus::Up));
        cycle.alerts.extend(reconciled.alerts);
        cycle.interfaces = reconciled.observations;
        cycle.extra_samples = reconciled.extra_samples;
        cycle.mac_changes = reconciled.mac_changes;
        cycle.links = links;

        let summary = self.store.commit_cycle(&cycle).await?;
        tracing::debug!(
            device = %device.hostname,
            interfaces = summary.interfaces,
            new_interfaces = reconciled.created,
            mac_changes = summary.mac_changes,
            links = summary.links,
            alerts = summary.alerts,
            "Device cycle committed"
        );
        Ok(PollOutcome::Reachable(summary))
    }
}

/// Alert for a device status change, if `observed` differs from the stored status.
fn device_alert(device: &Device, observed: OperStatus) -> Option<NewAlert> {
    if device.status == observed {
        return None;
    }
    let alert = match observed {
        OperStatus::Down => NewAlert::device(
            AlertKind::DeviceDown,
            format!("Device {} ({}) is unreachable", device.hostname, device.ip_address),
        ),
        OperStatus::Up => NewAlert::device(
            AlertKind::DeviceUp,
            format!("Device {} ({}) is reachable", device.hostname, device.ip_address),
        ),
    };
    Some(alert)
}
