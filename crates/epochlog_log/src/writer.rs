//! Log writer: splits entries into block-confined records.

use crate::block::block_remaining;
use crate::error::{LogError, LogResult};
use crate::reader::LogReader;
use crate::record::{encode_record, RecordType, BLOCK_SIZE, HEADER_SIZE};
use crate::rewind::rewind;
use epochlog_storage::{BackendCursor, StorageBackend};
use tracing::{debug, warn};

static ZEROS: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Returns the number of padding bytes that must precede a record written
/// at `offset`, and whether that padding skips over a torn header.
fn padding(offset: u64) -> (usize, bool) {
    // Safe: the remainder is below BLOCK_SIZE
    let used = (offset % BLOCK_SIZE as u64) as usize;
    if used > 0 && used < HEADER_SIZE {
        // An earlier write stopped inside a header; nothing in this block
        // can be trusted to line up with it.
        (BLOCK_SIZE - used, true)
    } else if BLOCK_SIZE - used <= HEADER_SIZE {
        (BLOCK_SIZE - used, false)
    } else {
        (0, false)
    }
}

/// Returns the offset at which a record appended at `offset` will actually
/// start, once any block padding has been written.
///
/// Callers use this to record the position of an entry (for example as an
/// epoch pointer) before appending it.
///
/// ```rust
/// use epochlog_log::{aligned, BLOCK_SIZE, HEADER_SIZE};
///
/// assert_eq!(aligned(100), 100);
/// let tail = (BLOCK_SIZE - HEADER_SIZE) as u64;
/// assert_eq!(aligned(tail), BLOCK_SIZE as u64);
/// ```
#[must_use]
pub fn aligned(offset: u64) -> u64 {
    offset + padding(offset).0 as u64
}

/// Appends one entry to `backend`, which must currently end at `offset`.
///
/// The entry is written as a single `Full` record when it fits in the
/// remainder of the current block, and as `First`, `Middle`..., `Last`
/// records otherwise. `scratch` is reused as the encoding buffer.
///
/// Returns the number of bytes written, padding included.
///
/// # Errors
///
/// Returns an error if the backend fails. Some bytes of the entry may have
/// reached storage; the backend's size reports how many.
pub fn append<B: StorageBackend + ?Sized>(
    backend: &mut B,
    offset: u64,
    data: &[u8],
    scratch: &mut Vec<u8>,
) -> LogResult<u64> {
    let mut written = 0u64;

    let (pad, torn) = padding(offset);
    if pad > 0 {
        if torn {
            warn!(offset, pad, "skipping torn record header at end of log");
        }
        backend.append(&ZEROS[..pad])?;
        written += pad as u64;
    }

    let base = written;
    let mut rest = data;
    loop {
        let room = BLOCK_SIZE - ((offset + written) % BLOCK_SIZE as u64) as usize - HEADER_SIZE;
        let first = written == base;
        let (typ, n) = match (rest.len() <= room, first) {
            (true, true) => (RecordType::Full, rest.len()),
            (true, false) => (RecordType::Last, rest.len()),
            (false, true) => (RecordType::First, room),
            (false, false) => (RecordType::Middle, room),
        };

        scratch.clear();
        encode_record(scratch, typ, written - base, &rest[..n]);
        backend.append(scratch)?;
        written += scratch.len() as u64;

        rest = &rest[n..];
        if typ.ends_entry() {
            return Ok(written);
        }
    }
}

/// Returns true if the log ends right after a complete entry, or is empty.
fn ends_cleanly<B: StorageBackend + ?Sized>(backend: &B, size: u64) -> LogResult<bool> {
    if size == 0 {
        return Ok(true);
    }
    let Some(start) = rewind(backend, size)? else {
        return Ok(false);
    };
    let mut reader = LogReader::new(BackendCursor::new(backend, start), start);
    match reader.read() {
        Ok(Some(_)) => Ok(reader.offset() == size),
        Ok(None) => Ok(false),
        Err(err) if err.is_corrupted() || err.is_unexpected_eof() => Ok(false),
        Err(err) => Err(err),
    }
}

/// A stateful writer that appends entries to a storage backend.
///
/// `LogWriter` is a thin wrapper around [`append`] that tracks the stream
/// offset. It only appends: making entries durable is the caller's choice,
/// via [`LogWriter::sync`].
///
/// # Example
///
/// ```rust
/// use epochlog_log::{LogReader, LogWriter};
/// use epochlog_storage::{BackendCursor, InMemoryBackend};
///
/// let mut writer = LogWriter::new(InMemoryBackend::new(), 0);
/// writer.append(b"first").unwrap();
/// writer.append(b"second").unwrap();
///
/// let backend = writer.into_inner();
/// let mut reader = LogReader::new(BackendCursor::new(&backend, 0), 0);
/// assert_eq!(reader.read().unwrap().as_deref(), Some(&b"first"[..]));
/// assert_eq!(reader.read().unwrap().as_deref(), Some(&b"second"[..]));
/// assert!(reader.read().unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct LogWriter<B: StorageBackend> {
    backend: B,
    offset: u64,
    /// The stream ends inside a record; the next entry must start on a
    /// fresh block.
    torn: bool,
    scratch: Vec<u8>,
}

impl<B: StorageBackend> LogWriter<B> {
    /// Creates a writer for a backend that currently ends at `offset`, on a
    /// clean entry boundary.
    pub fn new(backend: B, offset: u64) -> Self {
        Self {
            backend,
            offset,
            torn: false,
            scratch: Vec::with_capacity(BLOCK_SIZE),
        }
    }

    /// Creates a writer positioned at the end of `backend`.
    ///
    /// If the log does not end right after its last complete entry (an
    /// earlier append was cut short), the next entry starts on the
    /// following block boundary so that it stays readable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn open(backend: B) -> LogResult<Self> {
        let offset = backend.size()?;
        let torn = !ends_cleanly(&backend, offset)?;
        if torn {
            warn!(offset, "log ends inside a record; next entry starts a new block");
        }
        let mut writer = Self::new(backend, offset);
        writer.torn = torn;
        Ok(writer)
    }

    /// Appends an entry and returns the offset at which it starts.
    ///
    /// On failure the writer re-reads the backend size, so that later
    /// appends line up with whatever reached storage. If part of the entry
    /// landed, the next entry starts on a fresh block.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn append(&mut self, data: &[u8]) -> LogResult<u64> {
        if self.torn {
            self.seal_block()?;
        }
        let start = aligned(self.offset);
        match append(&mut self.backend, self.offset, data, &mut self.scratch) {
            Ok(n) => {
                self.offset += n;
                Ok(start)
            }
            Err(err) => {
                self.resize_after_failure();
                Err(err)
            }
        }
    }

    /// Pads the rest of the current block with zeros, or a whole block when
    /// the torn write ended on a boundary. A reader stuck inside an
    /// unfinished entry then resyncs before reaching the next entry.
    fn seal_block(&mut self) -> LogResult<()> {
        let pad = block_remaining(self.offset);
        debug!(offset = self.offset, pad, "sealing block after torn write");
        if let Err(err) = self.backend.append(&ZEROS[..pad]) {
            self.resize_after_failure();
            return Err(err.into());
        }
        self.offset += pad as u64;
        self.torn = false;
        Ok(())
    }

    fn resize_after_failure(&mut self) {
        if let Ok(size) = self.backend.size() {
            if size != self.offset {
                self.torn = true;
            }
            self.offset = size;
        }
    }

    /// Returns the offset at which the next entry will start.
    #[must_use]
    pub fn tell(&self) -> u64 {
        if self.torn {
            self.offset + block_remaining(self.offset) as u64
        } else {
            aligned(self.offset)
        }
    }

    /// Returns the current end of the stream, before any padding.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Flushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend flush fails.
    pub fn flush(&mut self) -> LogResult<()> {
        self.backend.flush().map_err(LogError::from)
    }

    /// Commits appended entries to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend sync fails.
    pub fn sync(&mut self) -> LogResult<()> {
        self.backend.sync().map_err(LogError::from)
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the underlying backend mutably.
    ///
    /// Appending through this reference desynchronizes the writer.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Consumes the writer, returning the backend.
    pub fn into_inner(self) -> B {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, MAX_RECORD_DATA};
    use epochlog_storage::{InMemoryBackend, StorageError, StorageResult};

    /// Walks every record in `buf` from offset 0, skipping padding.
    fn records(buf: &[u8]) -> Vec<(u64, RecordType, u64, usize)> {
        let mut out = Vec::new();
        let mut pos = 0usize;
        while pos < buf.len() {
            let block_end = (pos / BLOCK_SIZE + 1) * BLOCK_SIZE;
            if block_end - pos <= HEADER_SIZE {
                pos = block_end;
                continue;
            }
            let window = &buf[..block_end.min(buf.len())];
            let rec = Record::parse(window, pos).expect("valid record");
            out.push((pos as u64, rec.typ, rec.offset, rec.data.len()));
            pos += rec.encoded_len();
        }
        out
    }

    #[test]
    fn aligned_matches_padding_rule() {
        let bs = BLOCK_SIZE as u64;
        let hs = HEADER_SIZE as u64;
        assert_eq!(aligned(0), 0);
        assert_eq!(aligned(bs - hs - 1), bs - hs - 1);
        assert_eq!(aligned(bs - hs), bs);
        assert_eq!(aligned(bs - 1), bs);
        assert_eq!(aligned(bs), bs);
        // Inside a torn header at the start of a block
        assert_eq!(aligned(bs + 3), 2 * bs);
        assert_eq!(aligned(bs + hs), bs + hs);
    }

    #[test]
    fn small_entry_is_one_full_record() {
        let mut backend = InMemoryBackend::new();
        let n = append(&mut backend, 0, b"hello", &mut Vec::new()).unwrap();
        assert_eq!(n, (HEADER_SIZE + 5) as u64);
        assert_eq!(records(&backend.data()), vec![(0, RecordType::Full, 0, 5)]);
    }

    #[test]
    fn empty_entry_is_written() {
        let mut backend = InMemoryBackend::new();
        let n = append(&mut backend, 0, b"", &mut Vec::new()).unwrap();
        assert_eq!(n, HEADER_SIZE as u64);
        assert_eq!(records(&backend.data()), vec![(0, RecordType::Full, 0, 0)]);
    }

    #[test]
    fn entry_filling_a_block_exactly() {
        let mut backend = InMemoryBackend::new();
        let data = vec![7u8; MAX_RECORD_DATA];
        let n = append(&mut backend, 0, &data, &mut Vec::new()).unwrap();
        assert_eq!(n, BLOCK_SIZE as u64);
        assert_eq!(
            records(&backend.data()),
            vec![(0, RecordType::Full, 0, MAX_RECORD_DATA)]
        );
    }

    #[test]
    fn large_entry_spans_blocks() {
        let mut backend = InMemoryBackend::new();
        let data = vec![1u8; 2 * BLOCK_SIZE + 10];
        append(&mut backend, 0, &data, &mut Vec::new()).unwrap();

        let recs = records(&backend.data());
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0], (0, RecordType::First, 0, MAX_RECORD_DATA));
        let bs = BLOCK_SIZE as u64;
        assert_eq!(recs[1], (bs, RecordType::Middle, bs, MAX_RECORD_DATA));
        assert_eq!(
            recs[2],
            (2 * bs, RecordType::Last, 2 * bs, 2 * BLOCK_SIZE + 10 - 2 * MAX_RECORD_DATA)
        );
    }

    #[test]
    fn tail_of_block_is_padded() {
        let mut backend = InMemoryBackend::new();
        let mut scratch = Vec::new();
        // Leave exactly HEADER_SIZE bytes in the first block.
        let first = vec![0xAAu8; MAX_RECORD_DATA - HEADER_SIZE];
        let mut off = append(&mut backend, 0, &first, &mut scratch).unwrap();
        assert_eq!(off, (BLOCK_SIZE - HEADER_SIZE) as u64);

        off += append(&mut backend, off, b"next", &mut scratch).unwrap();
        assert_eq!(off, (BLOCK_SIZE + HEADER_SIZE + 4) as u64);
        let recs = records(&backend.data());
        assert_eq!(recs[1], (BLOCK_SIZE as u64, RecordType::Full, 0, 4));
    }

    #[test]
    fn torn_header_is_skipped() {
        let mut backend = InMemoryBackend::with_data(vec![0xEE; BLOCK_SIZE + 4]);
        let start = backend.size().unwrap();
        let n = append(&mut backend, start, b"x", &mut Vec::new()).unwrap();
        assert_eq!(start + n, (2 * BLOCK_SIZE + HEADER_SIZE + 1) as u64);
        let data = backend.data();
        assert!(data[BLOCK_SIZE + 4..2 * BLOCK_SIZE].iter().all(|&b| b == 0));
    }

    #[test]
    fn records_never_cross_block_boundaries() {
        let mut backend = InMemoryBackend::new();
        let mut scratch = Vec::new();
        let mut off = 0;
        for size in [1usize, 40_000, 0, 32_750, 32_752, 100_000, 3] {
            off += append(&mut backend, off, &vec![9u8; size], &mut scratch).unwrap();
        }
        for (pos, _, _, len) in records(&backend.data()) {
            let end = pos + (HEADER_SIZE + len) as u64;
            assert_eq!(pos / BLOCK_SIZE as u64, (end - 1) / BLOCK_SIZE as u64);
        }
    }

    #[test]
    fn writer_tracks_offsets() {
        let mut writer = LogWriter::new(InMemoryBackend::new(), 0);
        assert_eq!(writer.append(b"a").unwrap(), 0);
        assert_eq!(writer.tell(), (HEADER_SIZE + 1) as u64);
        let second = writer.tell();
        assert_eq!(writer.append(b"bc").unwrap(), second);
        assert_eq!(writer.offset(), writer.backend().size().unwrap());
        writer.sync().unwrap();
        writer.flush().unwrap();
    }

    #[test]
    fn writer_open_positions_at_end() {
        let mut backend = InMemoryBackend::new();
        append(&mut backend, 0, b"existing", &mut Vec::new()).unwrap();
        let size = backend.size().unwrap();

        let mut writer = LogWriter::open(backend).unwrap();
        assert_eq!(writer.offset(), size);
        assert_eq!(writer.append(b"more").unwrap(), size);
    }

    /// Accepts `room` more bytes; the write that crosses it lands a prefix
    /// and fails.
    struct ShortBackend {
        inner: InMemoryBackend,
        room: usize,
    }

    impl StorageBackend for ShortBackend {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            if data.len() > self.room {
                let n = self.room;
                self.room = 0;
                self.inner.append(&data[..n])?;
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "no space left",
                )));
            }
            self.room -= data.len();
            self.inner.append(data)
        }

        fn flush(&mut self) -> StorageResult<()> {
            Ok(())
        }

        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }

        fn sync(&mut self) -> StorageResult<()> {
            Ok(())
        }
    }

    fn read_back<B: StorageBackend>(backend: &B) -> Vec<Result<Vec<u8>, u64>> {
        LogReader::new(BackendCursor::new(backend, 0), 0)
            .map(|item| {
                item.map_err(|err| match err {
                    LogError::Corrupted { offset } => offset,
                    other => panic!("unexpected error {other}"),
                })
            })
            .collect()
    }

    #[test]
    fn failed_append_moves_next_entry_to_new_block() {
        let backend = ShortBackend {
            inner: InMemoryBackend::new(),
            room: 25,
        };
        let mut writer = LogWriter::new(backend, 0);
        writer.append(b"a").unwrap();
        let torn = writer.tell();
        assert!(writer.append(&[2u8; 20]).is_err());
        assert_eq!(writer.offset(), 25);
        assert_eq!(writer.tell(), BLOCK_SIZE as u64);

        writer.backend_mut().room = usize::MAX;
        assert_eq!(writer.append(b"c").unwrap(), BLOCK_SIZE as u64);
        assert_eq!(
            read_back(writer.backend()),
            vec![Ok(b"a".to_vec()), Err(torn), Ok(b"c".to_vec())]
        );
    }

    #[test]
    fn failed_append_without_landed_bytes_keeps_position() {
        let backend = ShortBackend {
            inner: InMemoryBackend::new(),
            room: HEADER_SIZE + 1,
        };
        let mut writer = LogWriter::new(backend, 0);
        writer.append(b"a").unwrap();
        assert!(writer.append(b"b").is_err());
        assert_eq!(writer.tell(), (HEADER_SIZE + 1) as u64);

        writer.backend_mut().room = usize::MAX;
        assert_eq!(writer.append(b"b").unwrap(), (HEADER_SIZE + 1) as u64);
    }

    #[test]
    fn reopen_over_torn_tail_starts_new_block() {
        let mut backend = InMemoryBackend::new();
        let mut scratch = Vec::new();
        let mut off = append(&mut backend, 0, b"u1", &mut scratch).unwrap();
        let torn = off;
        off += append(&mut backend, off, &[7u8; 500], &mut scratch).unwrap();
        let mut data = backend.into_data();
        data.truncate(off as usize - 480);

        let mut writer = LogWriter::open(InMemoryBackend::with_data(data)).unwrap();
        assert_eq!(writer.tell(), BLOCK_SIZE as u64);
        assert_eq!(writer.append(b"u2").unwrap(), BLOCK_SIZE as u64);

        let backend = writer.into_inner();
        let end = backend.size().unwrap();
        assert_eq!(rewind(&backend, end).unwrap(), Some(BLOCK_SIZE as u64));
        assert_eq!(
            read_back(&backend),
            vec![Ok(b"u1".to_vec()), Err(torn), Ok(b"u2".to_vec())]
        );
    }

    #[test]
    fn reopen_after_torn_header_or_lone_fragment() {
        // Only part of a header landed.
        let mut backend = InMemoryBackend::new();
        append(&mut backend, 0, b"x", &mut Vec::new()).unwrap();
        let mut data = backend.into_data();
        data.extend_from_slice(&[1, 2, 3]);
        let writer = LogWriter::open(InMemoryBackend::with_data(data)).unwrap();
        assert_eq!(writer.tell(), BLOCK_SIZE as u64);

        // Nothing complete at all.
        let writer = LogWriter::open(InMemoryBackend::with_data(vec![9u8; 40])).unwrap();
        assert_eq!(writer.tell(), BLOCK_SIZE as u64);

        // An empty log is clean.
        let writer = LogWriter::open(InMemoryBackend::new()).unwrap();
        assert_eq!(writer.tell(), 0);
    }

    #[test]
    fn torn_entry_ending_on_block_boundary_gets_a_zero_block() {
        // The first record of a two-block entry lands, the second does not.
        let backend = ShortBackend {
            inner: InMemoryBackend::new(),
            room: BLOCK_SIZE,
        };
        let mut writer = LogWriter::new(backend, 0);
        assert!(writer.append(&[3u8; BLOCK_SIZE + 100]).is_err());
        assert_eq!(writer.offset(), BLOCK_SIZE as u64);
        assert_eq!(writer.tell(), 2 * BLOCK_SIZE as u64);

        writer.backend_mut().room = usize::MAX;
        assert_eq!(writer.append(b"next").unwrap(), 2 * BLOCK_SIZE as u64);
        assert_eq!(
            read_back(writer.backend()),
            vec![Err(BLOCK_SIZE as u64), Ok(b"next".to_vec())]
        );

        // Reopening the torn log picks the same layout.
        let mut data = writer.into_inner().inner.into_data();
        data.truncate(BLOCK_SIZE);
        let writer = LogWriter::open(InMemoryBackend::with_data(data)).unwrap();
        assert_eq!(writer.tell(), 2 * BLOCK_SIZE as u64);
    }
}
