//! Polling engine error types.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors that abort a device poll.
///
/// An unreachable agent is not an error: it is recorded as the device going
/// down. Only failures to read or persist state surface here.
#[derive(Debug, Error)]
pub enum PollError {
    /// Reading or committing fleet state failed; the cycle was rolled back.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
