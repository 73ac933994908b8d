//! Configuration module for fleetwatch.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (URL, pool size)
//! - Poller and notifier timing
//! - Device seeds, inline or from an include directory

mod app;
mod devices;
mod validation;

pub use app::{AppConfig, DatabaseConfig, NotifierConfig, PollerConfig, ServerConfig};
pub use devices::{DeviceSeed, DevicesConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_DATABASE_URL, DEFAULT_NOTIFY_INTERVAL, DEFAULT_POLL_INTERVAL,
    MIN_NOTIFY_INTERVAL, MIN_POLL_INTERVAL,
};
