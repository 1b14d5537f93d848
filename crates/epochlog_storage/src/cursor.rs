//! Sequential `Read + Seek` view over a storage backend.

use crate::backend::StorageBackend;
use std::io::{self, Read, Seek, SeekFrom};

/// A positioned reader over a borrowed [`StorageBackend`].
///
/// Log readers consume plain `std::io::Read` streams; the cursor lets them
/// read from any backend without the backend having a notion of position.
/// Reads stop at the backend's size at the time of the read, so a cursor
/// observes data appended after it was created.
///
/// # Example
///
/// ```rust
/// use epochlog_storage::{BackendCursor, InMemoryBackend};
/// use std::io::{Read, Seek, SeekFrom};
///
/// let backend = InMemoryBackend::with_data(b"hello world".to_vec());
/// let mut cursor = BackendCursor::new(&backend, 6);
/// let mut buf = String::new();
/// cursor.read_to_string(&mut buf).unwrap();
/// assert_eq!(buf, "world");
/// assert_eq!(cursor.seek(SeekFrom::End(0)).unwrap(), 11);
/// ```
#[derive(Debug)]
pub struct BackendCursor<'a, B: StorageBackend + ?Sized> {
    backend: &'a B,
    pos: u64,
}

impl<'a, B: StorageBackend + ?Sized> BackendCursor<'a, B> {
    /// Creates a cursor positioned at `offset`.
    pub fn new(backend: &'a B, offset: u64) -> Self {
        Self {
            backend,
            pos: offset,
        }
    }

    /// Returns the current position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Moves the cursor to `offset`.
    pub fn set_position(&mut self, offset: u64) {
        self.pos = offset;
    }

    /// Returns the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &'a B {
        self.backend
    }
}

impl<B: StorageBackend + ?Sized> Read for BackendCursor<'_, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let data = self.backend.read_available(self.pos, buf.len())?;
        buf[..data.len()].copy_from_slice(&data);
        self.pos += data.len() as u64;
        Ok(data.len())
    }
}

impl<B: StorageBackend + ?Sized> Seek for BackendCursor<'_, B> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(offset) => {
                self.pos = offset;
                return Ok(offset);
            }
            SeekFrom::End(delta) => (self.backend.size()?, delta),
            SeekFrom::Current(delta) => (self.pos, delta),
        };
        match base.checked_add_signed(delta) {
            Some(next) => {
                self.pos = next;
                Ok(next)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
