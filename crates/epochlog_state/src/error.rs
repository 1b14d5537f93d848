//! Error types for the state layer.

use epochlog_log::LogError;
use epochlog_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while writing or restoring state.
#[derive(Debug, Error)]
pub enum StateError {
    /// Error from the underlying log.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A state entry is malformed or inconsistent with its epoch.
    #[error("corrupt state entry at offset {offset}: {reason}")]
    CorruptState {
        /// Offset of the offending log entry.
        offset: u64,
        /// Description of the inconsistency.
        reason: String,
    },
}

impl StateError {
    /// Creates a corrupt-state error.
    pub fn corrupt_state(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptState {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns true if this error reports corrupted data, either in a log
    /// record or in a state entry.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::Log(err) => err.is_corrupted(),
            Self::CorruptState { .. } => true,
            _ => false,
        }
    }
}
