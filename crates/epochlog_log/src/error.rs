//! Error types for log operations.

use epochlog_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors returned by log writers, readers and [`crate::rewind`].
#[derive(Debug, Error)]
pub enum LogError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record failed checksum or sequencing validation.
    ///
    /// The reader re-syncs on the next call to `read`, skipping to the next
    /// block that begins an entry.
    #[error("corrupted log record at offset {offset}")]
    Corrupted {
        /// Stream offset of the offending record.
        offset: u64,
    },

    /// The stream ended in the middle of a multi-record entry.
    #[error("unexpected end of log inside entry starting at offset {offset}")]
    UnexpectedEof {
        /// Stream offset of the entry's first record.
        offset: u64,
    },
}

impl LogError {
    /// Returns true if this error reports corrupted log data.
    ///
    /// Callers may keep reading after a corruption error; entries up to the
    /// next resynchronization point are skipped.
    #[must_use]
    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }

    /// Returns true if the log ended inside an entry (a torn write).
    #[must_use]
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, Self::UnexpectedEof { .. })
    }
}
