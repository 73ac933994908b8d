//! Scripted agents and store helpers for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::snmp::{Oid, OidSuffix, ProtocolClient, SnmpError, SnmpValue, Target, WalkRows};
use crate::storage::{FleetStore, NewDevice, StorageBuilder};

type Script = Result<WalkRows, SnmpError>;

/// A [`ProtocolClient`] answering from per-host scripted tables.
///
/// Hosts without any script are unreachable; a known host answers unscripted
/// tables with no rows.
#[derive(Default)]
pub(crate) struct MockAgent {
    tables: Mutex<HashMap<(String, Oid), Script>>,
    hosts: Mutex<Vec<String>>,
    panic_hosts: Mutex<Vec<String>>,
    walks: AtomicUsize,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the rows returned for `oid` on `host`.
    pub fn set_table(&self, host: &str, oid: &Oid, rows: WalkRows) {
        self.set(host, oid, Ok(rows));
    }

    /// Script a failure for `oid` on `host`.
    pub fn fail_table(&self, host: &str, oid: &Oid, error: SnmpError) {
        self.set(host, oid, Err(error));
    }

    /// Make every request to `host` panic.
    pub fn panic_on(&self, host: &str) {
        self.panic_hosts.lock().unwrap().push(host.to_string());
    }

    pub fn walk_count(&self) -> usize {
        self.walks.load(Ordering::SeqCst)
    }

    fn set(&self, host: &str, oid: &Oid, script: Script) {
        let mut hosts = self.hosts.lock().unwrap();
        if !hosts.iter().any(|h| h == host) {
            hosts.push(host.to_string());
        }
        self.tables
            .lock()
            .unwrap()
            .insert((host.to_string(), oid.clone()), script);
    }

    fn answer(&self, target: &Target, oid: &Oid) -> Script {
        if self.panic_hosts.lock().unwrap().iter().any(|h| h == &target.host) {
            panic!("scripted agent failure for {}", target.host);
        }
        if !self.hosts.lock().unwrap().iter().any(|h| h == &target.host) {
            return Err(unreachable(&target.host));
        }
        self.tables
            .lock()
            .unwrap()
            .get(&(target.host.clone(), oid.clone()))
            .cloned()
            .unwrap_or_else(|| Ok(WalkRows::new()))
    }
}

#[async_trait::async_trait]
impl ProtocolClient for MockAgent {
    async fn get(&self, target: &Target, oid: &Oid) -> Result<Option<SnmpValue>, SnmpError> {
        let rows = self.answer(target, oid)?;
        Ok(rows.into_values().next())
    }

    async fn walk(&self, target: &Target, prefix: &Oid) -> Result<WalkRows, SnmpError> {
        self.walks.fetch_add(1, Ordering::SeqCst);
        self.answer(target, prefix)
    }
}

pub(crate) fn unreachable(host: &str) -> SnmpError {
    SnmpError::Unreachable {
        target: format!("{host}:161"),
        reason: "timeout".to_string(),
    }
}

/// One walk row at `arcs` below the scanned column.
pub(crate) fn row(arcs: &[u32], value: SnmpValue) -> (OidSuffix, SnmpValue) {
    (OidSuffix::new(arcs.to_vec()), value)
}

pub(crate) fn rows(entries: impl IntoIterator<Item = (OidSuffix, SnmpValue)>) -> WalkRows {
    entries.into_iter().collect()
}

pub(crate) fn text(s: &str) -> SnmpValue {
    SnmpValue::OctetString(s.as_bytes().to_vec())
}

pub(crate) async fn memory_store() -> FleetStore {
    StorageBuilder::new("sqlite::memory:")
        .build()
        .await
        .expect("in-memory store")
}

pub(crate) async fn seed_device(store: &FleetStore, hostname: &str, ip: &str) -> i64 {
    store
        .insert_device_if_not_exists(&NewDevice {
            hostname: hostname.to_string(),
            ip_address: ip.to_string(),
            community: "public".to_string(),
        })
        .await
        .expect("insert device")
        .expect("new device")
}
