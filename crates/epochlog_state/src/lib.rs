//! # epochlog state
//!
//! Snapshot and update persistence on top of the epochlog log.
//!
//! State is written as two kinds of entries:
//!
//! - **Snapshots** hold a complete copy of the state and open a new epoch,
//!   identified by the snapshot's offset in the log
//! - **Updates** hold a delta and record the epoch they apply to
//!
//! [`restore`] rebuilds the current state from the end of the log without
//! scanning it from the start: it rewinds to the last complete entry,
//! follows its epoch pointer to the latest snapshot, and yields the updates
//! written since.
//!
//! ## Entry Format
//!
//! ```text
//! | kind (1) | epoch (8, little-endian) | payload |
//! ```
//!
//! Kind 1 is an update and kind 2 a snapshot. A snapshot's epoch field
//! holds the epoch it replaces.
//!
//! ## Example
//!
//! ```rust
//! use epochlog_state::{restore_backend, StateWriter};
//! use epochlog_storage::InMemoryBackend;
//!
//! let mut writer = StateWriter::new(InMemoryBackend::new(), 0, 0);
//! writer.snapshot(b"S1").unwrap();
//! writer.update(b"U1").unwrap();
//! writer.update(b"U2").unwrap();
//! let backend = writer.into_inner();
//!
//! let mut restored = restore_backend(&backend).unwrap();
//! assert_eq!(restored.state.as_deref(), Some(&b"S1"[..]));
//! assert_eq!(restored.updates.read().unwrap(), Some(b"U1".to_vec()));
//! assert_eq!(restored.updates.read().unwrap(), Some(b"U2".to_vec()));
//! assert_eq!(restored.updates.read().unwrap(), None);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entry;
mod error;
mod file;
mod restore;
mod writer;

pub use config::Config;
pub use entry::{decode_entry, encode_entry, EntryHeader, EntryKind, ENTRY_HEADER_SIZE};
pub use error::{StateError, StateResult};
pub use file::StateFile;
pub use restore::{restore, restore_backend, restore_seek, Restored, UpdatesReader};
pub use writer::StateWriter;
