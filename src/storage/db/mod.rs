//! Database connection layer.
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect("sqlite:fleetwatch.db?mode=rwc", 5).await?;
//! let row = sqlx::query("SELECT 1").fetch_one(pool.inner()).await?;
//! ```

mod sqlite;

pub use sqlite::{DEFAULT_MAX_CONNECTIONS, SqlitePool};
