//! Core data types for the storage layer.
//!
//! - [`Device`], [`Interface`], [`InterfaceSample`], [`TopologyLink`], [`Alert`],
//!   [`MacChange`]: persisted records
//! - [`DeviceCycle`]: everything one device poll writes, committed atomically
//! - [`DeviceSnapshot`], [`InterfaceStats`]: views pushed to live subscribers

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Operational status shared by devices and interfaces.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OperStatus {
    Up,
    #[default]
    Down,
}

/// Alert urgency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// What transition raised an alert.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AlertKind {
    DeviceDown,
    DeviceUp,
    InterfaceDown,
    InterfaceUp,
}

impl AlertKind {
    /// Severity attached to alerts of this kind.
    pub fn severity(self) -> AlertSeverity {
        match self {
            Self::DeviceDown | Self::InterfaceDown => AlertSeverity::Critical,
            Self::DeviceUp | Self::InterfaceUp => AlertSeverity::Info,
        }
    }
}

// =============================================================================
// Persisted records
// =============================================================================

/// A managed device from the directory.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: i64,
    pub hostname: String,
    /// Canonical textual address; unique across the directory.
    pub ip_address: String,
    #[serde(skip)]
    pub community: String,
    pub status: OperStatus,
    /// Time of the last successful poll; cleared when the device goes down.
    pub last_seen: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("hostname", &self.hostname)
            .field("ip_address", &self.ip_address)
            .field("status", &self.status)
            .field("last_seen", &self.last_seen)
            .finish_non_exhaustive()
    }
}

/// A device to add to the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDevice {
    pub hostname: String,
    pub ip_address: String,
    pub community: String,
}

/// An interface of a device, identified by `(device_id, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    pub id: i64,
    pub device_id: i64,
    pub name: String,
    pub status: OperStatus,
    pub mac_address: Option<String>,
    pub speed_bps: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only traffic observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceSample {
    pub id: i64,
    pub interface_id: i64,
    pub ts: DateTime<Utc>,
    pub in_bps: i64,
    pub out_bps: i64,
}

/// A directed neighbor relation between two known devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyLink {
    pub id: i64,
    pub src_device_id: i64,
    pub src_interface: String,
    pub dst_device_id: i64,
    pub dst_interface: String,
    pub last_seen: DateTime<Utc>,
}

/// A recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub id: i64,
    pub device_id: i64,
    pub interface_id: Option<i64>,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A hardware address change seen on a known interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacChange {
    pub id: i64,
    pub device_id: i64,
    pub interface_id: Option<i64>,
    pub old_mac: String,
    pub new_mac: String,
    pub changed_at: DateTime<Utc>,
}

// =============================================================================
// Poll cycle write set
// =============================================================================

/// Interface state observed in one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceObservation {
    pub name: String,
    pub status: OperStatus,
    /// `None` keeps the stored value.
    pub mac_address: Option<String>,
    /// `None` keeps the stored value.
    pub speed_bps: Option<i64>,
    pub in_bps: i64,
    pub out_bps: i64,
}

/// Traffic of an extra table index that shares a name already observed this
/// cycle. Appended to that interface's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleObservation {
    pub interface_name: String,
    pub in_bps: i64,
    pub out_bps: i64,
}

/// Hardware address change to log; the interface is resolved on commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacChangeObservation {
    pub interface_name: String,
    pub old_mac: String,
    pub new_mac: String,
}

/// A neighbor relation resolved to a known peer device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkObservation {
    pub src_interface: String,
    pub dst_device_id: i64,
    pub dst_interface: String,
}

/// An alert to record; `interface_name` is resolved to an id on commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub kind: AlertKind,
    pub interface_name: Option<String>,
    pub message: String,
}

impl NewAlert {
    pub fn device(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            interface_name: None,
            message: message.into(),
        }
    }

    pub fn interface(kind: AlertKind, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            interface_name: Some(name.into()),
            message: message.into(),
        }
    }

    pub fn severity(&self) -> AlertSeverity {
        self.kind.severity()
    }
}

/// Everything one device poll persists. Committed in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCycle {
    pub device_id: i64,
    pub observed_at: DateTime<Utc>,
    pub status: OperStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub interfaces: Vec<InterfaceObservation>,
    pub extra_samples: Vec<SampleObservation>,
    pub mac_changes: Vec<MacChangeObservation>,
    pub links: Vec<LinkObservation>,
    pub alerts: Vec<NewAlert>,
}

impl DeviceCycle {
    /// A successful poll: status up, last seen at observation time.
    pub fn reachable(device_id: i64, observed_at: DateTime<Utc>) -> Self {
        Self {
            device_id,
            observed_at,
            status: OperStatus::Up,
            last_seen: Some(observed_at),
            interfaces: Vec::new(),
            extra_samples: Vec::new(),
            mac_changes: Vec::new(),
            links: Vec::new(),
            alerts: Vec::new(),
        }
    }

    /// A failed interface scan: status down, last seen cleared, nothing else.
    pub fn unreachable(device_id: i64, observed_at: DateTime<Utc>) -> Self {
        Self {
            device_id,
            observed_at,
            status: OperStatus::Down,
            last_seen: None,
            interfaces: Vec::new(),
            extra_samples: Vec::new(),
            mac_changes: Vec::new(),
            links: Vec::new(),
            alerts: Vec::new(),
        }
    }
}

/// Row counts written by a committed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub interfaces: usize,
    pub samples: usize,
    pub mac_changes: usize,
    pub links: usize,
    pub alerts: usize,
}

// =============================================================================
// Live snapshot
// =============================================================================

/// Device entry of the broadcast payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub device_id: i64,
    pub hostname: String,
    pub ip: String,
    pub status: OperStatus,
    pub interfaces: Vec<InterfaceSnapshot>,
}

/// Interface entry of the broadcast payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceSnapshot {
    pub name: String,
    pub status: OperStatus,
    pub speed_bps: Option<i64>,
    pub mac: Option<String>,
}

/// An interface with its most recent sample, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceStats {
    pub interface: Interface,
    pub stats: Option<InterfaceSample>,
}

// =============================================================================
// Timestamp encoding
// =============================================================================

/// Encode a timestamp as Unix milliseconds.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Decode Unix milliseconds; out-of-range values clamp to the epoch.
pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}
