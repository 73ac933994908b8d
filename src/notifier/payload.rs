//! Wire format of live updates.

use std::sync::Arc;

use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::storage::{Alert, DeviceSnapshot, InterfaceStats, TopologyLink};

/// Number of alerts carried by one [`BroadcastMessage::Alerts`] push.
pub const RECENT_ALERTS_LIMIT: u32 = 10;

/// Feed a live connection subscribes to, chosen with `/ws?channel=`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, EnumString, EnumIter, Display, AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Channel {
    /// Devices with their interfaces. Used when no channel is named.
    #[default]
    Devices,
    /// Every interface with its latest sample.
    Stats,
    /// The most recent alerts.
    Alerts,
    /// Discovered neighbor links.
    Topology,
}

/// Message pushed to subscribers of one channel.
///
/// Serialized as `{"type": "<kind>", "data": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BroadcastMessage {
    DeviceUpdate(Vec<DeviceSnapshot>),
    Stats(Vec<InterfaceStats>),
    Alerts(Vec<Alert>),
    Topology(Vec<TopologyLink>),
}

impl BroadcastMessage {
    /// Serialize once; the result is shared by every subscriber.
    pub fn encode(&self) -> Result<Arc<str>, serde_json::Error> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }
}
