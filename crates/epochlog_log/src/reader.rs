//! Sequential log reader with block-level resynchronization.

use crate::block::Block;
use crate::error::{LogError, LogResult};
use crate::record::RecordType;
use std::io::Read;
use tracing::{debug, warn};

/// Reads entries sequentially from a log stream.
///
/// The reader validates every record as it goes. When a record fails
/// validation, [`LogReader::read`] returns [`LogError::Corrupted`] and the
/// following call resynchronizes: the rest of the current block is
/// discarded and reading resumes at the first record that begins an entry
/// in a later block. Entries between the corruption and that point are lost.
///
/// # Example
///
/// ```rust
/// use epochlog_log::{LogReader, LogWriter};
/// use epochlog_storage::{BackendCursor, InMemoryBackend};
///
/// let mut writer = LogWriter::new(InMemoryBackend::new(), 0);
/// writer.append(b"entry").unwrap();
/// let backend = writer.into_inner();
///
/// let reader = LogReader::new(BackendCursor::new(&backend, 0), 0);
/// let entries: Vec<Vec<u8>> = reader.collect::<Result<_, _>>().unwrap();
/// assert_eq!(entries, vec![b"entry".to_vec()]);
/// ```
#[derive(Debug)]
pub struct LogReader<R> {
    inner: R,
    block: Block,
    needs_resync: bool,
    entry_offset: Option<u64>,
}

impl<R: Read> LogReader<R> {
    /// Creates a reader over `inner`, whose current position in the log
    /// stream is `offset`.
    ///
    /// `offset` must be an entry boundary, such as 0, a value returned by
    /// [`crate::rewind`], or a [`crate::LogWriter::tell`] result.
    pub fn new(inner: R, offset: u64) -> Self {
        Self {
            inner,
            block: Block::new(offset),
            needs_resync: false,
            entry_offset: None,
        }
    }

    /// Reads the next entry.
    ///
    /// Returns `Ok(None)` at the end of the stream.
    ///
    /// # Errors
    ///
    /// - [`LogError::Corrupted`] if a record fails validation; the next call
    ///   resynchronizes, possibly skipping entries
    /// - [`LogError::UnexpectedEof`] if the stream ends inside an entry
    /// - [`LogError::Io`] if the underlying reader fails
    pub fn read(&mut self) -> LogResult<Option<Vec<u8>>> {
        if self.needs_resync {
            if !self.resync()? {
                return Ok(None);
            }
            self.needs_resync = false;
        }

        // Start offset and accumulated data of a multi-record entry.
        let mut partial: Option<(u64, Vec<u8>)> = None;
        loop {
            if self.block.exhausted() {
                let end = self.block.end();
                if self.block.load(&mut self.inner, end)? == 0 {
                    return match partial {
                        None => Ok(None),
                        Some((offset, _)) => Err(LogError::UnexpectedEof { offset }),
                    };
                }
                continue;
            }

            let pos = self.block.position();
            let record = self.block.peek().filter(|rec| match &partial {
                None => rec.typ.begins_entry(),
                Some((start, _)) => !rec.typ.begins_entry() && pos - start == rec.offset,
            });
            let Some(record) = record else {
                warn!(offset = pos, "corrupted log record");
                self.needs_resync = true;
                return Err(LogError::Corrupted { offset: pos });
            };
            self.block.consume(&record);
            let data = self.block.data(&record);

            match record.typ {
                RecordType::Full => {
                    self.entry_offset = Some(pos);
                    return Ok(Some(data.to_vec()));
                }
                RecordType::First => partial = Some((pos, data.to_vec())),
                RecordType::Middle | RecordType::Last => {
                    if let Some((start, buf)) = partial.as_mut() {
                        buf.extend_from_slice(data);
                        if record.typ == RecordType::Last {
                            self.entry_offset = Some(*start);
                            return Ok(partial.map(|(_, buf)| buf));
                        }
                    }
                }
            }
        }
    }

    /// Loads blocks until one holds a record that begins an entry, leaving
    /// the block positioned at it. Returns false at the end of the stream.
    fn resync(&mut self) -> LogResult<bool> {
        let from = self.block.position();
        loop {
            let end = self.block.end();
            if self.block.load(&mut self.inner, end)? == 0 {
                debug!(from, "resync reached end of log");
                return Ok(false);
            }
            while let Some(record) = self.block.peek() {
                if record.typ.begins_entry() {
                    let to = self.block.offset_of(&record);
                    debug!(from, to, skipped = to - from, "resynchronized log reader");
                    return Ok(true);
                }
                self.block.consume(&record);
            }
        }
    }

    /// Returns the start offset of the entry most recently returned by
    /// [`LogReader::read`].
    #[must_use]
    pub fn entry_offset(&self) -> Option<u64> {
        self.entry_offset
    }

    /// Returns the stream offset up to which records have been consumed.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.block.position()
    }

    /// Discards all state and continues reading from `inner`, positioned
    /// at stream `offset`.
    pub fn reset(&mut self, inner: R, offset: u64) {
        *self = Self::new(inner, offset);
    }

    /// Consumes the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Iterator for LogReader<R> {
    type Item = LogResult<Vec<u8>>;

    /// Yields entries; a corruption error is yielded as an item and the
    /// following call resumes after it.
    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}
