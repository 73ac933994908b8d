//! Storage builder.
//!
//! Opens the pool, applies embedded migrations and hands back a [`FleetStore`].

use std::path::Path;

use crate::storage::db::SqlitePool;
use crate::storage::{FleetStore, StorageError};

/// Minimum connection pool size.
const MIN_POOL_SIZE: u32 = 2;

/// Maximum connection pool size.
const MAX_POOL_SIZE: u32 = 32;

/// Calculate default pool size based on available CPU parallelism.
///
/// Returns the number of available CPUs, clamped between MIN_POOL_SIZE and MAX_POOL_SIZE.
fn default_pool_size() -> u32 {
    std::thread::available_parallelism()
        .map(|p| (p.get() as u32).clamp(MIN_POOL_SIZE, MAX_POOL_SIZE))
        .unwrap_or(4)
}

/// Builder for constructing the storage layer.
#[derive(Debug, Clone)]
pub struct StorageBuilder {
    url: String,
    max_connections: u32,
}

impl StorageBuilder {
    /// Create a new storage builder for a sqlx SQLite URL.
    ///
    /// Pool size defaults to the number of available CPUs (clamped to 2-32).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_pool_size(),
        }
    }

    /// Set the connection pool size.
    pub fn max_connections(mut self, size: u32) -> Self {
        self.max_connections = size;
        self
    }

    /// Connect, run migrations and return the store.
    pub async fn build(self) -> Result<FleetStore, StorageError> {
        create_parent_dir(&self.url)?;

        let pool = SqlitePool::connect(&self.url, self.max_connections).await?;
        sqlx::migrate!("./migrations").run(pool.inner()).await?;
        tracing::debug!(url = %self.url, "Database schema up to date");

        Ok(FleetStore::new(pool))
    }
}

/// Create the parent directory of a file-backed database URL.
fn create_parent_dir(url: &str) -> Result<(), StorageError> {
    let Some(path) = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")) else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(':') || path.starts_with("file:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::InvalidData(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}
