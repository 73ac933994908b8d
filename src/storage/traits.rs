//! The persistence seam used by the poller and the change notifier.

use crate::storage::{
    Alert, CommitSummary, Device, DeviceCycle, DeviceSnapshot, Interface, InterfaceStats,
    StorageError, TopologyLink,
};

/// Durable state consulted and written by the polling engine.
///
/// Implementations must make [`StateStore::commit_cycle`] atomic: either
/// every row of the cycle becomes visible or none does.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Current device directory, in id order.
    async fn list_devices(&self) -> Result<Vec<Device>, StorageError>;

    /// Exact-match lookup on the device address.
    async fn find_device_by_address(&self, address: &str) -> Result<Option<Device>, StorageError>;

    /// Known interfaces of a device.
    async fn interfaces_for_device(&self, device_id: i64) -> Result<Vec<Interface>, StorageError>;

    /// Persist one device's poll results in a single transaction.
    async fn commit_cycle(&self, cycle: &DeviceCycle) -> Result<CommitSummary, StorageError>;

    /// Every device with its current interfaces.
    async fn snapshot(&self) -> Result<Vec<DeviceSnapshot>, StorageError>;

    /// Every interface with its most recent sample.
    async fn latest_samples(&self) -> Result<Vec<InterfaceStats>, StorageError>;

    /// The newest `limit` alerts across the fleet, newest first.
    async fn recent_alerts(&self, limit: u32) -> Result<Vec<Alert>, StorageError>;

    /// All topology links, in discovery order.
    async fn list_links(&self) -> Result<Vec<TopologyLink>, StorageError>;
}
