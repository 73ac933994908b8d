//! fleetwatch - SNMP Fleet Poller
//!
//! Polls a directory of network devices over SNMPv2c on a fixed interval,
//! keeps interface state and throughput history in SQLite, discovers LLDP
//! neighbors among known devices, raises state-change alerts and pushes a
//! fleet snapshot to WebSocket subscribers.
//!
//! # Architecture
//!
//! - **snmp**: `ProtocolClient` boundary and the UDP transport behind it
//! - **storage**: sqlx/SQLite `StateStore`, one transaction per device cycle
//! - **poller**: per-device cycle, interface and topology passes, fleet scheduler
//! - **notifier**: per-channel subscriber registry and periodic broadcast
//! - **server**: health probes and the `/ws` endpoint
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fleetwatch::{DevicePoller, PollScheduler, SnmpClient, StorageBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(StorageBuilder::new("sqlite:fleet.db?mode=rwc").build().await?);
//!     let client = Arc::new(SnmpClient::default());
//!     let interval = std::time::Duration::from_secs(5);
//!
//!     let poller = DevicePoller::new(client, store.clone(), interval);
//!     let handle = PollScheduler::new(poller, store, interval).spawn();
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod lifecycle;
pub mod notifier;
pub mod poller;
pub mod server;
pub mod snmp;
pub mod storage;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, ConfigError};
pub use lifecycle::{DEFAULT_SHUTDOWN_TIMEOUT, LoopHandle, ShutdownOutcome};
pub use notifier::{ChangeNotifier, Channel, SubscriberRegistry};
pub use poller::{CycleReport, DevicePoller, PollOutcome, PollScheduler};
pub use snmp::{ProtocolClient, SnmpClient, SnmpClientConfig, SnmpError, SnmpValue, Target};
pub use storage::{FleetStore, StateStore, StorageBuilder, StorageError};
