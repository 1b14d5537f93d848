//! # epochlog log
//!
//! A block-framed, append-only log that tolerates torn writes and
//! corruption.
//!
//! ## Format
//!
//! The stream is divided into blocks of [`BLOCK_SIZE`] bytes. Each entry is
//! written as one or more records, and no record crosses a block boundary:
//!
//! ```text
//! | checksum (4) | type (1) | length (2) | entry offset (8) | data (length) |
//! ```
//!
//! All integers are little-endian. The checksum covers every byte after it
//! (xxh64, seed 0, low 32 bits). An entry that fits in the rest of the
//! current block is a single `Full` record; otherwise it is a `First`
//! record, zero or more `Middle` records and a `Last` record. The entry
//! offset of a record is its distance in bytes from the entry's first
//! record, so `Full` and `First` carry 0.
//!
//! When [`HEADER_SIZE`] bytes or fewer remain in a block, they are zero
//! padded and the next record starts at the following block.
//!
//! ## Recovery
//!
//! - [`LogReader`] detects corrupt records and resynchronizes at the next
//!   block that begins an entry.
//! - [`rewind`] finds the last complete entry before an offset by reading
//!   only the tail of the log.
//!
//! ## Example
//!
//! ```rust
//! use epochlog_log::{rewind, LogReader, LogWriter};
//! use epochlog_storage::{BackendCursor, InMemoryBackend, StorageBackend};
//!
//! let mut writer = LogWriter::new(InMemoryBackend::new(), 0);
//! writer.append(b"one").unwrap();
//! let last = writer.append(b"two").unwrap();
//! let backend = writer.into_inner();
//!
//! let start = rewind(&backend, backend.size().unwrap()).unwrap();
//! assert_eq!(start, Some(last));
//!
//! let mut reader = LogReader::new(BackendCursor::new(&backend, last), last);
//! assert_eq!(reader.read().unwrap(), Some(b"two".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod block;
mod error;
mod reader;
mod record;
mod rewind;
mod writer;

pub use error::{LogError, LogResult};
pub use reader::LogReader;
pub use record::{checksum, RecordType, BLOCK_SIZE, HEADER_SIZE, MAX_RECORD_DATA};
pub use rewind::{rewind, rewind_seek};
pub use writer::{aligned, append, LogWriter};
