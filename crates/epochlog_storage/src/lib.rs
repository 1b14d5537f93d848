//! # epochlog storage
//!
//! Byte-store abstraction underneath the epochlog log format.
//!
//! Backends are **opaque byte stores**: they append bytes, read them back at
//! an offset, and make them durable on request. Block framing, checksums and
//! state entries are interpreted by `epochlog_log` and `epochlog_state`; no
//! backend knows about them.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral logs
//! - [`FileBackend`] - For persistent logs using OS file APIs
//!
//! [`BackendCursor`] adapts any backend to `std::io::Read + std::io::Seek`,
//! which is how sequential log readers consume a backend.
//!
//! ## Example
//!
//! ```rust
//! use epochlog_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cursor;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use cursor::BackendCursor;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
