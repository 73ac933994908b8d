//! Interface table scan, per-interface readings and reconciliation.
//!
//! The name column is the primary scan: if it fails the device is down. Every
//! other column is secondary and degrades to a default per index.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::snmp::{
    IF_DESCR, IF_IN_OCTETS, IF_OPER_STATUS, IF_OUT_OCTETS, IF_PHYS_ADDRESS, ProtocolClient,
    SnmpError, SnmpValue, TableIndex, Target, WalkRows,
};
use crate::storage::{
    AlertKind, Interface, InterfaceObservation, MacChangeObservation, NewAlert, OperStatus,
    SampleObservation,
};

/// ifOperStatus value meaning "up"; every other value maps to down.
pub const OPER_STATUS_UP: i64 = 1;

/// A secondary column keyed by interface index, or the error that lost it.
pub type Column = Result<BTreeMap<TableIndex, SnmpValue>, SnmpError>;

/// Raw interface tables fetched from one device in a single cycle.
#[derive(Debug, Clone)]
pub struct InterfaceTables {
    /// Interface names by index. Entries with no usable text are dropped.
    pub names: BTreeMap<TableIndex, String>,
    pub oper_status: Column,
    pub in_octets: Column,
    pub out_octets: Column,
    pub phys_address: Column,
}

/// Derived state of one interface for this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceReading {
    pub index: TableIndex,
    pub name: String,
    pub status: OperStatus,
    pub mac_address: Option<String>,
    pub in_bps: i64,
    pub out_bps: i64,
    /// Set from the inbound rate when the inbound counter read non-zero.
    pub speed_bps: Option<i64>,
}

/// Convert an octet count over `interval` into bits per second.
///
/// The count is used as-is (no delta against the previous poll), truncated
/// toward zero. A zero interval yields zero.
pub fn bit_rate(octets: u64, interval: Duration) -> i64 {
    let millis = interval.as_millis();
    if millis == 0 {
        return 0;
    }
    let bps = u128::from(octets) * 8 * 1000 / millis;
    i64::try_from(bps).unwrap_or(i64::MAX)
}

/// Scans interface tables and derives per-interface readings.
#[derive(Clone)]
pub struct InterfacePoller {
    client: Arc<dyn ProtocolClient>,
    interval: Duration,
}

impl std::fmt::Debug for InterfacePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfacePoller")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl InterfacePoller {
    pub fn new(client: Arc<dyn ProtocolClient>, interval: Duration) -> Self {
        Self { client, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Scan all interface columns concurrently.
    ///
    /// Fails only when the name scan fails.
    pub async fn fetch(&self, target: &Target) -> Result<InterfaceTables, SnmpError> {
        let (names, oper_status, in_octets, out_octets, phys_address) = tokio::join!(
            self.client.walk(target, &IF_DESCR),
            self.client.walk(target, &IF_OPER_STATUS),
            self.client.walk(target, &IF_IN_OCTETS),
            self.client.walk(target, &IF_OUT_OCTETS),
            self.client.walk(target, &IF_PHYS_ADDRESS),
        );

        Ok(InterfaceTables {
            names: name_column(names?),
            oper_status: oper_status.map(by_index),
            in_octets: in_octets.map(by_index),
            out_octets: out_octets.map(by_index),
            phys_address: phys_address.map(by_index),
        })
    }

    /// Derive one reading per named interface, degrading unreadable fields.
    pub fn readings(&self, tables: &InterfaceTables) -> Vec<InterfaceReading> {
        tables
            .names
            .iter()
            .map(|(&index, name)| {
                let mut degraded: Vec<&'static str> = Vec::new();

                let status = match read(&tables.oper_status, index, SnmpValue::as_i64) {
                    Ok(OPER_STATUS_UP) => OperStatus::Up,
                    Ok(_) => OperStatus::Down,
                    Err(_) => {
                        degraded.push("oper_status");
                        OperStatus::Down
                    }
                };

                let in_octets = read(&tables.in_octets, index, SnmpValue::as_u64)
                    .inspect_err(|_| degraded.push("in_octets"))
                    .ok();
                let out_octets = read(&tables.out_octets, index, SnmpValue::as_u64)
                    .inspect_err(|_| degraded.push("out_octets"))
                    .ok();
                let mac_address = read(&tables.phys_address, index, SnmpValue::as_mac).ok();

                let in_bps = in_octets.map_or(0, |o| bit_rate(o, self.interval));
                let out_bps = out_octets.map_or(0, |o| bit_rate(o, self.interval));

                if !degraded.is_empty() {
                    tracing::debug!(
                        interface = %name,
                        index = %index,
                        fields = ?degraded,
                        "Interface fields unavailable; using defaults"
                    );
                }

                InterfaceReading {
                    index,
                    name: name.clone(),
                    status,
                    mac_address,
                    in_bps,
                    out_bps,
                    speed_bps: in_octets.filter(|&o| o > 0).map(|_| in_bps),
                }
            })
            .collect()
    }
}

/// Result of matching readings against stored interfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub observations: Vec<InterfaceObservation>,
    /// Traffic of later indices that repeat an interface name.
    pub extra_samples: Vec<SampleObservation>,
    pub mac_changes: Vec<MacChangeObservation>,
    pub alerts: Vec<NewAlert>,
    /// Interfaces not previously stored.
    pub created: usize,
}

/// Match readings to stored interfaces by name and raise transition alerts.
///
/// Newly seen interfaces never alert. Duplicate names within one scan keep
/// the first (lowest index) reading for interface state; later indices only
/// contribute a traffic sample. A known interface whose hardware address
/// changed is logged as a [`MacChangeObservation`].
pub fn reconcile(hostname: &str, readings: &[InterfaceReading], known: &[Interface]) -> Reconciled {
    let known: HashMap<&str, &Interface> = known.iter().map(|i| (i.name.as_str(), i)).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Reconciled::default();

    for reading in readings {
        if !seen.insert(reading.name.as_str()) {
            tracing::debug!(
                device = hostname,
                interface = %reading.name,
                index = %reading.index,
                "Duplicate interface name; recording sample only"
            );
            out.extra_samples.push(SampleObservation {
                interface_name: reading.name.clone(),
                in_bps: reading.in_bps,
                out_bps: reading.out_bps,
            });
            continue;
        }

        match known.get(reading.name.as_str()) {
            None => out.created += 1,
            Some(previous) => {
                if previous.status != reading.status {
                    out.alerts.push(interface_alert(hostname, &reading.name, reading.status));
                }
                match (&previous.mac_address, &reading.mac_address) {
                    (Some(old), Some(new)) if old != new => {
                        tracing::info!(
                            device = hostname,
                            interface = %reading.name,
                            old_mac = %old,
                            new_mac = %new,
                            "Hardware address changed"
                        );
                        out.mac_changes.push(MacChangeObservation {
                            interface_name: reading.name.clone(),
                            old_mac: old.clone(),
                            new_mac: new.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }

        out.observations.push(InterfaceObservation {
            name: reading.name.clone(),
            status: reading.status,
            mac_address: reading.mac_address.clone(),
            speed_bps: reading.speed_bps,
            in_bps: reading.in_bps,
            out_bps: reading.out_bps,
        });
    }

    out
}

fn interface_alert(hostname: &str, name: &str, status: OperStatus) -> NewAlert {
    let (kind, word) = match status {
        OperStatus::Up => (AlertKind::InterfaceUp, "UP"),
        OperStatus::Down => (AlertKind::InterfaceDown, "DOWN"),
    };
    NewAlert::interface(kind, name, format!("Interface {name} of {hostname} is {word}"))
}

fn by_index(rows: WalkRows) -> BTreeMap<TableIndex, SnmpValue> {
    rows.into_iter()
        .filter_map(|(suffix, value)| suffix.table_index().map(|index| (index, value)))
        .collect()
}

fn name_column(rows: WalkRows) -> BTreeMap<TableIndex, String> {
    by_index(rows)
        .into_iter()
        .filter_map(|(index, value)| match value.as_text() {
            Some(name) if !name.is_empty() => Some((index, name)),
            _ => {
                tracing::debug!(index = %index, "Skipping interface without a usable name");
                None
            }
        })
        .collect()
}

/// Read and convert one cell of a secondary column.
fn read<T>(
    column: &Column,
    index: TableIndex,
    convert: impl Fn(&SnmpValue) -> Option<T>,
) -> Result<T, SnmpError> {
    let rows = column.as_ref().map_err(Clone::clone)?;
    let value = rows.get(&index).ok_or_else(|| SnmpError::Protocol {
        detail: format!("no entry for index {index}"),
    })?;
    convert(value).ok_or_else(|| SnmpError::Protocol {
        detail: format!("unexpected value {value:?} at index {index}"),
    })
}
