//! Backward search for the last complete entry.

use crate::block::Block;
use crate::error::LogResult;
use crate::record::{RecordType, BLOCK_SIZE, HEADER_SIZE};
use epochlog_storage::{BackendCursor, StorageBackend};
use tracing::debug;

const BS: u64 = BLOCK_SIZE as u64;

fn align_down(offset: u64) -> u64 {
    offset - offset % BS
}

/// Returns the start offset of the last complete entry that ends at or
/// before `limit`, or `None` if there is none.
///
/// Only the blocks at the end of the log are read: the block containing
/// `limit` is scanned forward for the last valid record that completes an
/// entry, and the entry's first record is located through that record's
/// entry offset. A candidate whose first record does not check out is
/// skipped and the search continues below it.
///
/// Passing the returned offset back as the next `limit` walks the log
/// backwards one entry at a time:
///
/// ```rust
/// use epochlog_log::{rewind, LogWriter};
/// use epochlog_storage::{InMemoryBackend, StorageBackend};
///
/// let mut writer = LogWriter::new(InMemoryBackend::new(), 0);
/// let a = writer.append(b"a").unwrap();
/// let b = writer.append(&[0u8; 50_000]).unwrap();
/// let backend = writer.into_inner();
///
/// let end = backend.size().unwrap();
/// assert_eq!(rewind(&backend, end).unwrap(), Some(b));
/// assert_eq!(rewind(&backend, b).unwrap(), Some(a));
/// assert_eq!(rewind(&backend, a).unwrap(), None);
/// ```
///
/// # Errors
///
/// Returns an error if the backend cannot be read.
pub fn rewind<B: StorageBackend + ?Sized>(backend: &B, limit: u64) -> LogResult<Option<u64>> {
    let mut block = Block::new(0);
    let mut limit = limit;

    loop {
        if limit < HEADER_SIZE as u64 {
            return Ok(None);
        }
        let mut block_start = align_down(limit);
        if block_start == limit {
            block_start -= BS;
        }
        block.load_at(backend, block_start, limit)?;

        // Position and entry offset of the last record completing an entry.
        let mut last = None;
        while let Some(record) = block.peek() {
            block.consume(&record);
            if record.typ.ends_entry() {
                last = Some((block.offset_of(&record), record.offset));
            }
        }

        limit = match last {
            Some((pos, 0)) => return Ok(Some(pos)),
            Some((pos, offset)) => match pos.checked_sub(offset) {
                Some(start) if begins_entry_at(backend, &mut block, start, limit)? => {
                    debug!(limit, start, "rewound to multi-record entry");
                    return Ok(Some(start));
                }
                Some(start) => {
                    debug!(limit, pos, start, "rejected rewind candidate");
                    start
                }
                None => block_start,
            },
            None => block_start,
        };
    }
}

/// Checks that a `First` record is stored at `start`.
fn begins_entry_at<B: StorageBackend + ?Sized>(
    backend: &B,
    block: &mut Block,
    start: u64,
    limit: u64,
) -> LogResult<bool> {
    block.load_at(backend, start, limit)?;
    Ok(block
        .peek()
        .is_some_and(|record| record.typ == RecordType::First))
}

/// Like [`rewind`], and also moves `cursor` to the returned offset so a
/// [`crate::LogReader`] can be built over it directly.
///
/// The cursor is left untouched when no entry is found.
///
/// # Errors
///
/// Returns an error if the backend cannot be read.
pub fn rewind_seek<B: StorageBackend + ?Sized>(
    cursor: &mut BackendCursor<'_, B>,
    limit: u64,
) -> LogResult<Option<u64>> {
    let found = rewind(cursor.backend(), limit)?;
    if let Some(offset) = found {
        cursor.set_position(offset);
    }
    Ok(found)
}
