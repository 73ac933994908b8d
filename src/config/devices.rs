//! Device seed configuration.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::storage::NewDevice;

use super::validation::{ConfigError, expand_env_vars, parse_ip};

fn default_community() -> String {
    "public".to_string()
}

/// One device to register on startup.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSeed {
    pub hostname: String,

    /// Management address polled over SNMP.
    pub ip: String,

    /// Read community; `${VAR}` and `${VAR:-default}` are expanded on load.
    #[serde(default = "default_community")]
    pub community: String,
}

impl std::fmt::Debug for DeviceSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSeed")
            .field("hostname", &self.hostname)
            .field("ip", &self.ip)
            .finish_non_exhaustive()
    }
}

impl DeviceSeed {
    pub fn new(hostname: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ip: ip.into(),
            community: default_community(),
        }
    }

    pub fn with_community(mut self, community: impl Into<String>) -> Self {
        self.community = community.into();
        self
    }

    /// Directory record with the address in canonical form and the
    /// community expanded.
    pub fn to_new_device(&self) -> Result<NewDevice, ConfigError> {
        let ip = parse_ip(&format!("ip for device '{}'", self.hostname), &self.ip)?;
        Ok(NewDevice {
            hostname: self.hostname.trim().to_string(),
            ip_address: ip.to_string(),
            community: expand_env_vars(&self.community),
        })
    }
}

/// Seed list, as found under `devices:` or in an include file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevicesConfig(pub Vec<DeviceSeed>);

/// Shape of a file under `device_path`.
#[derive(Debug, Default, Deserialize)]
struct DeviceFile {
    #[serde(default)]
    devices: DevicesConfig,
}

impl DevicesConfig {
    pub fn iter(&self) -> std::slice::Iter<'_, DeviceSeed> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge another seed list into this one.
    #[must_use]
    pub fn merge(mut self, other: DevicesConfig) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Hostnames must be non-empty; addresses must parse and be unique.
    ///
    /// Uniqueness is checked on the canonical address, so `2001:DB8::1`
    /// and `2001:db8::1` collide.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for seed in &self.0 {
            if seed.hostname.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "device hostname cannot be empty (ip '{}')",
                    seed.ip
                )));
            }
            let ip = parse_ip(&format!("ip for device '{}'", seed.hostname), &seed.ip)?;
            if !seen.insert(ip) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate device ip: '{ip}'"
                )));
            }
        }
        Ok(())
    }

    /// Load seeds from all YAML files in a directory.
    ///
    /// Each file holds a `devices:` list. Files are read in name order so
    /// the merged list is stable.
    pub fn load_from_dir(dir_path: &str) -> Result<Self, ConfigError> {
        let dir = Path::new(dir_path);
        if !dir.exists() {
            return Err(ConfigError::ValidationError(format!(
                "device_path '{}' does not exist",
                dir_path
            )));
        }
        if !dir.is_dir() {
            return Err(ConfigError::ValidationError(format!(
                "device_path '{}' is not a directory",
                dir_path
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext == "yaml" || ext == "yml" {
                paths.push(path);
            }
        }
        paths.sort();

        let mut merged = Self::default();
        for path in paths {
            tracing::debug!(path = %path.display(), "Loading device seeds");
            let content = std::fs::read_to_string(&path)?;
            let file: DeviceFile = serde_yaml::from_str(&content).map_err(|e| {
                ConfigError::ValidationError(format!("failed to parse '{}': {}", path.display(), e))
            })?;
            merged = merged.merge(file.devices);
        }

        Ok(merged)
    }
}
