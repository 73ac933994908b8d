//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Invalid data in database (e.g., unknown enum value) or a write that
    /// references a record that no longer exists.
    #[error("invalid data: {0}")]
    InvalidData(String),
}
