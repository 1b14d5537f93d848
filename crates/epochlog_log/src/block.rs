//! Block buffer shared by the reader and [`crate::rewind`].

use crate::record::{Record, BLOCK_SIZE, HEADER_SIZE};
use epochlog_storage::{StorageBackend, StorageResult};
use std::fmt;
use std::io::{self, Read};

/// Bytes left in the block containing `offset`, up to the next boundary.
pub(crate) fn block_remaining(offset: u64) -> usize {
    // Safe: the remainder is below BLOCK_SIZE
    BLOCK_SIZE - (offset % BLOCK_SIZE as u64) as usize
}

/// One loaded window of the stream, never crossing a block boundary.
pub(crate) struct Block {
    buf: Vec<u8>,
    /// Stream offset of `buf[0]`.
    base: u64,
    /// Bytes from `base` to the next block boundary.
    cap: usize,
    /// Bytes actually loaded; less than `cap` at the end of the stream.
    limit: usize,
    /// Position of the next unparsed record.
    pos: usize,
}

impl Block {
    /// Creates an empty block positioned at stream `offset`.
    pub fn new(offset: u64) -> Self {
        let mut block = Self {
            buf: vec![0u8; BLOCK_SIZE],
            base: 0,
            cap: 0,
            limit: 0,
            pos: 0,
        };
        block.reset(offset);
        block
    }

    /// Stream offset of the next unparsed byte.
    pub fn position(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Stream offset just past the loaded bytes, where the next load starts.
    pub fn end(&self) -> u64 {
        self.base + self.limit as u64
    }

    /// Stream offset of a record parsed from this block.
    pub fn offset_of(&self, record: &Record) -> u64 {
        self.base + record.pos as u64
    }

    /// Returns true when no further record can start in the loaded bytes:
    /// either the rest of the block is padding (`HEADER_SIZE` bytes or fewer
    /// before the boundary) or every loaded byte has been consumed.
    ///
    /// A non-empty remainder too short for a record is not exhausted; it is
    /// a torn write and fails to parse.
    pub fn exhausted(&self) -> bool {
        self.cap - self.pos <= HEADER_SIZE || self.pos >= self.limit
    }

    /// Loads the block starting at stream `offset` from a sequential reader
    /// positioned there. Returns the number of bytes loaded; 0 at end of stream.
    pub fn load<R: Read>(&mut self, reader: &mut R, offset: u64) -> io::Result<usize> {
        self.reset(offset);
        let n = read_full(reader, &mut self.buf[..self.cap])?;
        self.limit = n;
        Ok(n)
    }

    /// Loads the block starting at `offset` from a backend, reading no
    /// further than `limit`.
    pub fn load_at<B: StorageBackend + ?Sized>(
        &mut self,
        backend: &B,
        offset: u64,
        limit: u64,
    ) -> StorageResult<()> {
        self.reset(offset);
        let want = usize::try_from(limit.saturating_sub(offset)).map_or(self.cap, |n| n.min(self.cap));
        let data = backend.read_available(offset, want)?;
        self.buf[..data.len()].copy_from_slice(&data);
        self.limit = data.len();
        Ok(())
    }

    /// Parses the next record without consuming it.
    pub fn peek(&self) -> Option<Record> {
        if self.exhausted() {
            return None;
        }
        Record::parse(&self.buf[..self.limit], self.pos)
    }

    /// Consumes a record returned by [`Block::peek`].
    pub fn consume(&mut self, record: &Record) {
        self.pos = record.pos + record.encoded_len();
    }

    /// Data bytes of a record parsed from this block.
    pub fn data(&self, record: &Record) -> &[u8] {
        &self.buf[record.data.clone()]
    }

    fn reset(&mut self, offset: u64) {
        self.base = offset;
        self.cap = block_remaining(offset);
        self.limit = 0;
        self.pos = 0;
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("base", &self.base)
            .field("cap", &self.cap)
            .field("limit", &self.limit)
            .field("pos", &self.pos)
            .finish()
    }
}

/// Fills `buf` from `reader`, stopping early only at end of stream.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
