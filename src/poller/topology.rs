//! Neighbor discovery and link resolution.
//!
//! Neighbors come from the LLDP remote tables. Only neighbors whose
//! management address matches a device already in the directory become
//! links; everything else is discarded.

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use crate::snmp::{
    LLDP_REM_MAN_ADDR, LLDP_REM_PORT_DESC, LLDP_REM_SYS_NAME, ProtocolClient, SnmpError,
    TableIndex, Target, WalkRows,
};
use crate::storage::{Device, LinkObservation, StateStore, StorageError};

/// One remote system seen by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    /// Neighbor index, assumed equal to the local interface index.
    pub index: TableIndex,
    pub system_name: String,
    /// Remote port description; empty when the agent did not report one.
    pub port_description: String,
    pub management_address: Option<IpAddr>,
}

/// Fetches neighbor tables and resolves them against the directory.
#[derive(Clone)]
pub struct TopologyDiscoverer {
    client: Arc<dyn ProtocolClient>,
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for TopologyDiscoverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyDiscoverer").finish_non_exhaustive()
    }
}

impl TopologyDiscoverer {
    pub fn new(client: Arc<dyn ProtocolClient>, store: Arc<dyn StateStore>) -> Self {
        Self { client, store }
    }

    /// Read the neighbor tables.
    ///
    /// Fails only when the system name scan fails; port descriptions and
    /// addresses degrade to empty.
    pub async fn neighbors(&self, target: &Target) -> Result<Vec<Neighbor>, SnmpError> {
        let (names, ports, addresses) = tokio::join!(
            self.client.walk(target, &LLDP_REM_SYS_NAME),
            self.client.walk(target, &LLDP_REM_PORT_DESC),
            self.client.walk(target, &LLDP_REM_MAN_ADDR),
        );
        let names = names?;
        let ports = ports.unwrap_or_else(|e| {
            tracing::debug!(target = %target.host, error = %e, "Neighbor port scan failed");
            WalkRows::new()
        });
        let addresses = addresses.unwrap_or_else(|e| {
            tracing::debug!(target = %target.host, error = %e, "Neighbor address scan failed");
            WalkRows::new()
        });

        let port_by_index: BTreeMap<TableIndex, String> = ports
            .iter()
            .filter_map(|(suffix, value)| Some((suffix.neighbor_index()?, value.as_text()?)))
            .collect();

        let mut address_by_index: BTreeMap<TableIndex, IpAddr> = BTreeMap::new();
        for (suffix, value) in &addresses {
            let Some(index) = suffix.neighbor_index() else {
                continue;
            };
            let address = value
                .as_ip()
                .or_else(|| suffix.lldp_ipv4_address().map(IpAddr::V4));
            if let Some(address) = address {
                // First address per neighbor wins.
                address_by_index.entry(index).or_insert(address);
            }
        }

        Ok(names
            .iter()
            .filter_map(|(suffix, value)| {
                let index = suffix.neighbor_index()?;
                Some(Neighbor {
                    index,
                    system_name: value.as_text().unwrap_or_default(),
                    port_description: port_by_index.get(&index).cloned().unwrap_or_default(),
                    management_address: address_by_index.get(&index).copied(),
                })
            })
            .collect())
    }

    /// Discover links from `device` to known peers.
    ///
    /// `local_names` maps interface index to local interface name. A failed
    /// neighbor scan yields no links; only directory lookups can fail.
    pub async fn discover(
        &self,
        device: &Device,
        target: &Target,
        local_names: &BTreeMap<TableIndex, String>,
    ) -> Result<Vec<LinkObservation>, StorageError> {
        let neighbors = match self.neighbors(target).await {
            Ok(neighbors) => neighbors,
            Err(e) => {
                tracing::warn!(
                    device = %device.hostname,
                    error = %e,
                    "Neighbor discovery failed; skipping topology this cycle"
                );
                return Ok(Vec::new());
            }
        };

        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for neighbor in neighbors {
            let Some(address) = neighbor.management_address else {
                tracing::debug!(
                    device = %device.hostname,
                    neighbor = %neighbor.system_name,
                    "Neighbor has no management address"
                );
                continue;
            };
            let Some(local) = local_names.get(&neighbor.index) else {
                tracing::debug!(
                    device = %device.hostname,
                    neighbor = %neighbor.system_name,
                    index = %neighbor.index,
                    "No local interface for neighbor index"
                );
                continue;
            };
            let Some(peer) = self
                .store
                .find_device_by_address(&address.to_string())
                .await?
            else {
                tracing::debug!(
                    device = %device.hostname,
                    neighbor = %neighbor.system_name,
                    address = %address,
                    "Neighbor not in directory; discarded"
                );
                continue;
            };

            let link = LinkObservation {
                src_interface: local.clone(),
                dst_device_id: peer.id,
                dst_interface: neighbor.port_description,
            };
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }

        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::SnmpValue;
    use crate::testing::{MockAgent, memory_store, row, rows, seed_device, text};

    const HOST: &str = "10.0.0.1";

    fn target() -> Target {
        Target::new(HOST, "public")
    }

    fn local_names() -> BTreeMap<TableIndex, String> {
        BTreeMap::from([
            (TableIndex(1), "eth0".to_string()),
            (TableIndex(2), "eth1".to_string()),
        ])
    }

    #[tokio::test]
    async fn test_neighbors_join_tables_by_index() {
        let agent = Arc::new(MockAgent::new());
        agent.set_table(
            HOST,
            &LLDP_REM_SYS_NAME,
            rows([row(&[0, 7, 1], text("edge-1")), row(&[0, 8, 2], text("edge-2"))]),
        );
        agent.set_table(HOST, &LLDP_REM_PORT_DESC, rows([row(&[0, 7, 1], text("Gi0/1"))]));
        agent.set_table(
            HOST,
            &LLDP_REM_MAN_ADDR,
            rows([
                row(&[0, 7, 1, 1, 4, 10, 0, 0, 2], SnmpValue::Integer(2)),
                row(&[0, 8, 2], SnmpValue::OctetString(vec![10, 0, 0, 3])),
            ]),
        );

        let store = Arc::new(memory_store().await);
        let discoverer = TopologyDiscoverer::new(agent, store);
        let neighbors = discoverer.neighbors(&target()).await.unwrap();

        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].index, TableIndex(1));
        assert_eq!(neighbors[0].system_name, "edge-1");
        assert_eq!(neighbors[0].port_description, "Gi0/1");
        // Address decoded from the row index when the value is not an address.
        assert_eq!(neighbors[0].management_address, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(neighbors[1].port_description, "");
        assert_eq!(neighbors[1].management_address, Some("10.0.0.3".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_discover_resolves_known_neighbors_only() {
        let store = Arc::new(memory_store().await);
        let device_id = seed_device(&store, "core-1", HOST).await;
        let peer_id = seed_device(&store, "edge-1", "10.0.0.2").await;

        let agent = Arc::new(MockAgent::new());
        agent.set_table(
            HOST,
            &LLDP_REM_SYS_NAME,
            rows([row(&[1], text("edge-1")), row(&[2], text("stranger"))]),
        );
        agent.set_table(
            HOST,
            &LLDP_REM_PORT_DESC,
            rows([row(&[1], text("Gi0/1")), row(&[2], text("Gi0/9"))]),
        );
        agent.set_table(
            HOST,
            &LLDP_REM_MAN_ADDR,
            rows([
                row(&[1], SnmpValue::IpAddress([10, 0, 0, 2])),
                row(&[2], SnmpValue::IpAddress([192, 168, 9, 9])),
            ]),
        );

        let device = store.find_device_by_address(HOST).await.unwrap().unwrap();
        assert_eq!(device.id, device_id);

        let discoverer = TopologyDiscoverer::new(agent, store.clone());
        let links = discoverer
            .discover(&device, &target(), &local_names())
            .await
            .unwrap();

        assert_eq!(
            links,
            vec![LinkObservation {
                src_interface: "eth0".to_string(),
                dst_device_id: peer_id,
                dst_interface: "Gi0/1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_discover_skips_neighbors_without_address_or_local_interface() {
        let store = Arc::new(memory_store().await);
        seed_device(&store, "core-1", HOST).await;
        seed_device(&store, "edge-1", "10.0.0.2").await;

        let agent = Arc::new(MockAgent::new());
        agent.set_table(
            HOST,
            &LLDP_REM_SYS_NAME,
            rows([row(&[1], text("no-address")), row(&[5], text("edge-1"))]),
        );
        agent.set_table(
            HOST,
            &LLDP_REM_MAN_ADDR,
            rows([row(&[5], SnmpValue::IpAddress([10, 0, 0, 2]))]),
        );

        let device = store.find_device_by_address(HOST).await.unwrap().unwrap();
        let discoverer = TopologyDiscoverer::new(agent, store.clone());
        let links = discoverer
            .discover(&device, &target(), &local_names())
            .await
            .unwrap();
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn test_failed_neighbor_scan_yields_no_links() {
        let store = Arc::new(memory_store().await);
        seed_device(&store, "core-1", HOST).await;
        let device = store.find_device_by_address(HOST).await.unwrap().unwrap();

        // Agent knows nothing about the host: every scan is unreachable.
        let discoverer = TopologyDiscoverer::new(Arc::new(MockAgent::new()), store.clone());
        let links = discoverer
            .discover(&device, &target(), &local_names())
            .await
            .unwrap();
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_neighbor_rows_collapse() {
        let store = Arc::new(memory_store().await);
        seed_device(&store, "core-1", HOST).await;
        seed_device(&store, "edge-1", "10.0.0.2").await;

        let agent = Arc::new(MockAgent::new());
        agent.set_table(
            HOST,
            &LLDP_REM_SYS_NAME,
            rows([row(&[0, 1, 1], text("edge-1")), row(&[0, 2, 1], text("edge-1"))]),
        );
        agent.set_table(
            HOST,
            &LLDP_REM_MAN_ADDR,
            rows([row(&[0, 1, 1], SnmpValue::IpAddress([10, 0, 0, 2]))]),
        );

        let device = store.find_device_by_address(HOST).await.unwrap().unwrap();
        let discoverer = TopologyDiscoverer::new(agent, store.clone());
        let links = discoverer
            .discover(&device, &target(), &local_names())
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
    }
}
