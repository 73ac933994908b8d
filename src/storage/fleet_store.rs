//! SQLite-backed fleet state.
//!
//! Device directory, interface upserts, append-only samples, hardware address
//! changes, topology links and alerts. Each poll cycle is written in one
//! transaction ordered interfaces and samples, then address changes, then
//! links, then alerts, then device status.

use std::collections::{BTreeMap, HashMap};

use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::storage::db::SqlitePool;
use crate::storage::types::{from_millis, to_millis};
use crate::storage::{
    Alert, CommitSummary, Device, DeviceCycle, DeviceSnapshot, Interface, InterfaceSample,
    InterfaceSnapshot, InterfaceStats, MacChange, NewDevice, StateStore, StorageError,
    TopologyLink,
};

// =============================================================================
// SQL
// =============================================================================

const SELECT_DEVICE: &str =
    "SELECT id, hostname, ip_address, snmp_community, status, last_seen FROM devices";

const SELECT_INTERFACE: &str =
    "SELECT id, device_id, name, status, mac_address, speed_bps, updated_at FROM interfaces";

const UPSERT_INTERFACE: &str = r#"
    INSERT INTO interfaces (device_id, name, status, mac_address, speed_bps, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT (device_id, name) DO UPDATE SET
        status = excluded.status,
        mac_address = COALESCE(excluded.mac_address, interfaces.mac_address),
        speed_bps = COALESCE(excluded.speed_bps, interfaces.speed_bps),
        updated_at = excluded.updated_at
    RETURNING id
"#;

const INSERT_SAMPLE: &str =
    "INSERT INTO interface_samples (interface_id, ts, in_bps, out_bps) VALUES (?1, ?2, ?3, ?4)";

const INSERT_MAC_CHANGE: &str = r#"
    INSERT INTO mac_changes (device_id, interface_id, old_mac, new_mac, changed_at)
    VALUES (?1, ?2, ?3, ?4, ?5)
"#;

const SELECT_LATEST_SAMPLES: &str = r#"
    SELECT i.id, i.device_id, i.name, i.status, i.mac_address, i.speed_bps, i.updated_at,
           s.id AS sample_id, s.ts AS sample_ts, s.in_bps, s.out_bps
    FROM interfaces i
    LEFT JOIN interface_samples s ON s.id = (
        SELECT id FROM interface_samples
        WHERE interface_id = i.id
        ORDER BY ts DESC, id DESC
        LIMIT 1
    )
    ORDER BY i.device_id, i.name
"#;

const UPSERT_LINK: &str = r#"
    INSERT INTO topology_links (src_device_id, src_interface, dst_device_id, dst_interface, last_seen)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT (src_device_id, src_interface, dst_device_id, dst_interface) DO UPDATE SET
        last_seen = excluded.last_seen
"#;

const INSERT_ALERT: &str = r#"
    INSERT INTO alerts (device_id, interface_id, kind, severity, message, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

const UPDATE_DEVICE_STATUS: &str = "UPDATE devices SET status = ?1, last_seen = ?2 WHERE id = ?3";

// =============================================================================
// Fleet Store
// =============================================================================

/// sqlx implementation of [`StateStore`] plus directory and history queries.
#[derive(Debug, Clone)]
pub struct FleetStore {
    pool: SqlitePool,
}

impl FleetStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Liveness probe for the readiness endpoint.
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(self.pool.inner()).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert a device unless its address is already in the directory.
    ///
    /// Returns the new id, or `None` when the address was taken.
    pub async fn insert_device_if_not_exists(
        &self,
        device: &NewDevice,
    ) -> Result<Option<i64>, StorageError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO devices (hostname, ip_address, snmp_community, status, created_at)
            VALUES (?1, ?2, ?3, 'down', ?4)
            ON CONFLICT (ip_address) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&device.hostname)
        .bind(&device.ip_address)
        .bind(&device.community)
        .bind(chrono::Utc::now().timestamp_millis())
        .fetch_optional(self.pool.inner())
        .await?;
        Ok(id)
    }

    /// Remove a device and, by cascade, its interfaces, samples, links and alerts.
    pub async fn delete_device(&self, device_id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ?1")
            .bind(device_id)
            .execute(self.pool.inner())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Alerts of one device, oldest first.
    pub async fn alerts_for_device(&self, device_id: i64) -> Result<Vec<Alert>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, device_id, interface_id, kind, severity, message, created_at \
             FROM alerts WHERE device_id = ?1 ORDER BY id",
        )
        .bind(device_id)
        .fetch_all(self.pool.inner())
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    /// Hardware address changes of one device, oldest first.
    pub async fn mac_changes_for_device(
        &self,
        device_id: i64,
    ) -> Result<Vec<MacChange>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, device_id, interface_id, old_mac, new_mac, changed_at \
             FROM mac_changes WHERE device_id = ?1 ORDER BY id",
        )
        .bind(device_id)
        .fetch_all(self.pool.inner())
        .await?;

        rows.iter()
            .map(|row| -> Result<MacChange, StorageError> {
                Ok(MacChange {
                    id: row.try_get("id")?,
                    device_id: row.try_get("device_id")?,
                    interface_id: row.try_get("interface_id")?,
                    old_mac: row.try_get("old_mac")?,
                    new_mac: row.try_get("new_mac")?,
                    changed_at: from_millis(row.try_get("changed_at")?),
                })
            })
            .collect()
    }

    /// Samples of one interface, oldest first.
    pub async fn samples_for_interface(
        &self,
        interface_id: i64,
    ) -> Result<Vec<InterfaceSample>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, interface_id, ts, in_bps, out_bps \
             FROM interface_samples WHERE interface_id = ?1 ORDER BY id",
        )
        .bind(interface_id)
        .fetch_all(self.pool.inner())
        .await?;

        rows.iter()
            .map(|row| -> Result<InterfaceSample, StorageError> {
                Ok(InterfaceSample {
                    id: row.try_get("id")?,
                    interface_id: row.try_get("interface_id")?,
                    ts: from_millis(row.try_get("ts")?),
                    in_bps: row.try_get("in_bps")?,
                    out_bps: row.try_get("out_bps")?,
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl StateStore for FleetStore {
    async fn list_devices(&self) -> Result<Vec<Device>, StorageError> {
        let rows = sqlx::query(&format!("{SELECT_DEVICE} ORDER BY id"))
            .fetch_all(self.pool.inner())
            .await?;
        rows.iter().map(device_from_row).collect()
    }

    async fn find_device_by_address(&self, address: &str) -> Result<Option<Device>, StorageError> {
        let row = sqlx::query(&format!("{SELECT_DEVICE} WHERE ip_address = ?1"))
            .bind(address)
            .fetch_optional(self.pool.inner())
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn interfaces_for_device(&self, device_id: i64) -> Result<Vec<Interface>, StorageError> {
        let rows = sqlx::query(&format!(
            "{SELECT_INTERFACE} WHERE device_id = ?1 ORDER BY name"
        ))
        .bind(device_id)
        .fetch_all(self.pool.inner())
        .await?;
        rows.iter().map(interface_from_row).collect()
    }

    async fn commit_cycle(&self, cycle: &DeviceCycle) -> Result<CommitSummary, StorageError> {
        let now = to_millis(cycle.observed_at);
        let mut summary = CommitSummary::default();
        let mut interface_ids: HashMap<&str, i64> = HashMap::new();

        // Dropping `tx` on any early return rolls the whole cycle back.
        let mut tx = self.pool.inner().begin().await?;

        for observation in &cycle.interfaces {
            let interface_id: i64 = sqlx::query_scalar(UPSERT_INTERFACE)
                .bind(cycle.device_id)
                .bind(&observation.name)
                .bind(observation.status.as_ref())
                .bind(observation.mac_address.as_deref())
                .bind(observation.speed_bps)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;

            sqlx::query(INSERT_SAMPLE)
                .bind(interface_id)
                .bind(now)
                .bind(observation.in_bps)
                .bind(observation.out_bps)
                .execute(&mut *tx)
                .await?;

            interface_ids.insert(observation.name.as_str(), interface_id);
            summary.interfaces += 1;
            summary.samples += 1;
        }

        for sample in &cycle.extra_samples {
            let interface_id = interface_ids
                .get(sample.interface_name.as_str())
                .copied()
                .ok_or_else(|| {
                    StorageError::InvalidData(format!(
                        "sample for unobserved interface '{}'",
                        sample.interface_name
                    ))
                })?;
            sqlx::query(INSERT_SAMPLE)
                .bind(interface_id)
                .bind(now)
                .bind(sample.in_bps)
                .bind(sample.out_bps)
                .execute(&mut *tx)
                .await?;
            summary.samples += 1;
        }

        for change in &cycle.mac_changes {
            sqlx::query(INSERT_MAC_CHANGE)
                .bind(cycle.device_id)
                .bind(interface_ids.get(change.interface_name.as_str()).copied())
                .bind(&change.old_mac)
                .bind(&change.new_mac)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            summary.mac_changes += 1;
        }

        for link in &cycle.links {
            sqlx::query(UPSERT_LINK)
                .bind(cycle.device_id)
                .bind(&link.src_interface)
                .bind(link.dst_device_id)
                .bind(&link.dst_interface)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            summary.links += 1;
        }

        for alert in &cycle.alerts {
            let interface_id = alert
                .interface_name
                .as_deref()
                .and_then(|name| interface_ids.get(name).copied());
            sqlx::query(INSERT_ALERT)
                .bind(cycle.device_id)
                .bind(interface_id)
                .bind(alert.kind.as_ref())
                .bind(alert.severity().as_ref())
                .bind(&alert.message)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            summary.alerts += 1;
        }

        let updated = sqlx::query(UPDATE_DEVICE_STATUS)
            .bind(cycle.status.as_ref())
            .bind(cycle.last_seen.map(to_millis))
            .bind(cycle.device_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StorageError::InvalidData(format!(
                "device {} no longer exists",
                cycle.device_id
            )));
        }

        tx.commit().await?;
        Ok(summary)
    }

    async fn snapshot(&self) -> Result<Vec<DeviceSnapshot>, StorageError> {
        let devices = self.list_devices().await?;
        let rows = sqlx::query(&format!("{SELECT_INTERFACE} ORDER BY device_id, name"))
            .fetch_all(self.pool.inner())
            .await?;

        let mut by_device: BTreeMap<i64, Vec<InterfaceSnapshot>> = BTreeMap::new();
        for row in &rows {
            let interface = interface_from_row(row)?;
            by_device
                .entry(interface.device_id)
                .or_default()
                .push(InterfaceSnapshot {
                    name: interface.name,
                    status: interface.status,
                    speed_bps: interface.speed_bps,
                    mac: interface.mac_address,
                });
        }

        Ok(devices
            .into_iter()
            .map(|device| DeviceSnapshot {
                interfaces: by_device.remove(&device.id).unwrap_or_default(),
                device_id: device.id,
                hostname: device.hostname,
                ip: device.ip_address,
                status: device.status,
            })
            .collect())
    }

    async fn latest_samples(&self) -> Result<Vec<InterfaceStats>, StorageError> {
        let rows = sqlx::query(SELECT_LATEST_SAMPLES)
            .fetch_all(self.pool.inner())
            .await?;

        rows.iter()
            .map(|row| -> Result<InterfaceStats, StorageError> {
                let interface = interface_from_row(row)?;
                let sample_id: Option<i64> = row.try_get("sample_id")?;
                let stats = match sample_id {
                    Some(id) => Some(InterfaceSample {
                        id,
                        interface_id: interface.id,
                        ts: from_millis(row.try_get("sample_ts")?),
                        in_bps: row.try_get("in_bps")?,
                        out_bps: row.try_get("out_bps")?,
                    }),
                    None => None,
                };
                Ok(InterfaceStats { interface, stats })
            })
            .collect()
    }

    async fn recent_alerts(&self, limit: u32) -> Result<Vec<Alert>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, device_id, interface_id, kind, severity, message, created_at \
             FROM alerts ORDER BY created_at DESC, id DESC LIMIT ?1",
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool.inner())
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn list_links(&self) -> Result<Vec<TopologyLink>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, src_device_id, src_interface, dst_device_id, dst_interface, last_seen \
             FROM topology_links ORDER BY id",
        )
        .fetch_all(self.pool.inner())
        .await?;

        rows.iter()
            .map(|row| -> Result<TopologyLink, StorageError> {
                Ok(TopologyLink {
                    id: row.try_get("id")?,
                    src_device_id: row.try_get("src_device_id")?,
                    src_interface: row.try_get("src_interface")?,
                    dst_device_id: row.try_get("dst_device_id")?,
                    dst_interface: row.try_get("dst_interface")?,
                    last_seen: from_millis(row.try_get("last_seen")?),
                })
            })
            .collect()
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn parse_enum<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, StorageError> {
    value
        .parse()
        .map_err(|_| StorageError::InvalidData(format!("unknown {what} '{value}'")))
}

fn device_from_row(row: &SqliteRow) -> Result<Device, StorageError> {
    let status: String = row.try_get("status")?;
    let last_seen: Option<i64> = row.try_get("last_seen")?;
    Ok(Device {
        id: row.try_get("id")?,
        hostname: row.try_get("hostname")?,
        ip_address: row.try_get("ip_address")?,
        community: row.try_get("snmp_community")?,
        status: parse_enum(&status, "device status")?,
        last_seen: last_seen.map(from_millis),
    })
}

fn interface_from_row(row: &SqliteRow) -> Result<Interface, StorageError> {
    let status: String = row.try_get("status")?;
    Ok(Interface {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        name: row.try_get("name")?,
        status: parse_enum(&status, "interface status")?,
        mac_address: row.try_get("mac_address")?,
        speed_bps: row.try_get("speed_bps")?,
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

fn alert_from_row(row: &SqliteRow) -> Result<Alert, StorageError> {
    let kind: String = row.try_get("kind")?;
    let severity: String = row.try_get("severity")?;
    Ok(Alert {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        interface_id: row.try_get("interface_id")?,
        kind: parse_enum(&kind, "alert kind")?,
        severity: parse_enum(&severity, "alert severity")?,
        message: row.try_get("message")?,
        created_at: from_millis(row.try_get("created_at")?),
    })
}
