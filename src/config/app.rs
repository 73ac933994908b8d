//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::snmp::{DEFAULT_PORT, DEFAULT_RETRIES, DEFAULT_TIMEOUT, SnmpClientConfig};
use crate::storage::NewDevice;

use super::devices::DevicesConfig;
use super::validation::{ConfigError, ensure_at_least};

// =============================================================================
// Constants
// =============================================================================

/// Default database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:fleetwatch.db?mode=rwc";

/// Default polling interval (5 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum polling interval (1 second).
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default broadcast interval (1 second).
pub const DEFAULT_NOTIFY_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum broadcast interval (100 milliseconds).
pub const MIN_NOTIFY_INTERVAL: Duration = Duration::from_millis(100);

/// Default per-subscriber queue depth.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Upper bound on SNMP retries.
const MAX_RETRIES: u8 = 1;

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL (default: "sqlite:fleetwatch.db?mode=rwc").
    pub url: String,

    /// Pool size; derived from available CPUs when unset.
    pub max_connections: Option<u32>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: None,
        }
    }
}

// =============================================================================
// Poller Configuration
// =============================================================================

/// Polling loop and SNMP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Cycle period (default: 5s, minimum: 1s). Also the rate divisor.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Per-request timeout (default: 2s).
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Retries after a timed-out request (default: 1, maximum: 1).
    pub retries: u8,

    /// Agent UDP port (default: 161).
    pub port: u16,

    /// Devices polled at the same time; unbounded when unset.
    pub max_concurrent_polls: Option<usize>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            port: DEFAULT_PORT,
            max_concurrent_polls: None,
        }
    }
}

impl PollerConfig {
    pub fn client_config(&self) -> SnmpClientConfig {
        SnmpClientConfig {
            port: self.port,
            timeout: self.timeout,
            retries: self.retries,
        }
    }
}

// =============================================================================
// Notifier Configuration
// =============================================================================

/// Live update settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Broadcast period (default: 1s, minimum: 100ms).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Queue depth per connection before it counts as lagging (default: 16).
    pub channel_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_NOTIFY_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server configuration.
    pub server: ServerConfig,

    /// Database configuration.
    pub database: DatabaseConfig,

    /// Polling configuration.
    pub poller: PollerConfig,

    /// Live update configuration.
    pub notifier: NotifierConfig,

    /// Devices inserted on startup when their address is new.
    pub devices: DevicesConfig,

    /// Path to a directory with additional device seed files.
    pub device_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database url cannot be empty".to_string(),
            ));
        }
        if self.database.max_connections == Some(0) {
            return Err(ConfigError::ValidationError(
                "database max_connections must be positive".to_string(),
            ));
        }

        ensure_at_least("poller.interval", self.poller.interval, MIN_POLL_INTERVAL)?;
        if self.poller.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "poller.timeout must be positive".to_string(),
            ));
        }
        if self.poller.retries > MAX_RETRIES {
            return Err(ConfigError::ValidationError(format!(
                "poller.retries must be at most {MAX_RETRIES}, got {}",
                self.poller.retries
            )));
        }
        if self.poller.port == 0 {
            return Err(ConfigError::ValidationError(
                "poller.port must be non-zero".to_string(),
            ));
        }
        if self.poller.max_concurrent_polls == Some(0) {
            return Err(ConfigError::ValidationError(
                "poller.max_concurrent_polls must be positive".to_string(),
            ));
        }

        ensure_at_least("notifier.interval", self.notifier.interval, MIN_NOTIFY_INTERVAL)?;
        if self.notifier.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "notifier.channel_capacity must be positive".to_string(),
            ));
        }

        self.devices.validate()?;

        Ok(())
    }

    /// Load configuration including the device_path directory.
    ///
    /// If `device_path` is specified, scans the directory for YAML files
    /// and appends their seeds to the inline list.
    pub fn load_with_device_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;

        if let Some(ref device_dir) = config.device_path {
            let additional = DevicesConfig::load_from_dir(device_dir)?;
            config.devices = std::mem::take(&mut config.devices).merge(additional);
        }

        config.validate()?;
        Ok(config)
    }

    /// Convert seeds to directory records.
    pub fn to_new_devices(&self) -> Result<Vec<NewDevice>, ConfigError> {
        self.devices.iter().map(|seed| seed.to_new_device()).collect()
    }
}
