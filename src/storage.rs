//! Storage Layer
//!
//! Durable fleet state in SQLite through sqlx.
//!
//! # Components
//!
//! - [`StateStore`]: the seam the poller and notifier depend on
//! - [`FleetStore`]: sqlx implementation with directory and history queries
//! - [`StorageBuilder`]: connection, migrations and pool sizing

mod builder;
pub mod db;
mod error;
mod fleet_store;
mod traits;
mod types;

pub use builder::StorageBuilder;
pub use error::StorageError;
pub use fleet_store::FleetStore;
pub use traits::StateStore;
pub use types::{
    Alert, AlertKind, AlertSeverity, CommitSummary, Device, DeviceCycle, DeviceSnapshot,
    Interface, InterfaceObservation, InterfaceSample, InterfaceSnapshot, InterfaceStats,
    LinkObservation, MacChange, MacChangeObservation, NewAlert, NewDevice, OperStatus,
    SampleObservation, TopologyLink,
};
