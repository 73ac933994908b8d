//! Polling Engine
//!
//! - [`InterfacePoller`]: interface table scan and rate computation
//! - [`TopologyDiscoverer`]: neighbor tables resolved against the directory
//! - [`DevicePoller`]: one device's cycle, committed atomically
//! - [`PollScheduler`]: fleet fan-out on a fixed interval with failure isolation

mod device;
mod error;
pub mod interface;
mod scheduler;
pub mod topology;

pub use device::{DevicePoller, PollOutcome};
pub use error::PollError;
pub use interface::{InterfacePoller, InterfaceReading, InterfaceTables, bit_rate};
pub use scheduler::{CycleReport, PollScheduler};
pub use topology::{Neighbor, TopologyDiscoverer};
