//! Restoring state from the tail of a log.

use crate::entry::{into_parts, EntryHeader, EntryKind};
use crate::error::{StateError, StateResult};
use epochlog_log::{rewind, LogReader};
use epochlog_storage::{BackendCursor, StorageBackend};
use std::io::{Seek, SeekFrom};
use tracing::{debug, warn};

/// Result of [`restore`]: the latest snapshot, its epoch, and the updates
/// recorded since.
///
/// Applying every update yielded by `updates`, in order, on top of `state`
/// reconstructs the current state.
#[derive(Debug)]
pub struct Restored<'a, B: StorageBackend + ?Sized> {
    /// Payload of the most recent snapshot; `None` before the first one.
    pub state: Option<Vec<u8>>,
    /// Offset of the most recent snapshot; 0 before the first one.
    pub epoch: u64,
    /// Updates belonging to `epoch`, in append order.
    pub updates: UpdatesReader<'a, B>,
}

impl<B: StorageBackend + ?Sized> Restored<'_, B> {
    fn empty() -> Self {
        Self {
            state: None,
            epoch: 0,
            updates: UpdatesReader {
                log: None,
                epoch: 0,
            },
        }
    }
}

/// Yields the updates of a single epoch.
///
/// The reader ends at the end of the log or at the next snapshot.
#[derive(Debug)]
pub struct UpdatesReader<'a, B: StorageBackend + ?Sized> {
    log: Option<LogReader<BackendCursor<'a, B>>>,
    epoch: u64,
}

impl<B: StorageBackend + ?Sized> UpdatesReader<'_, B> {
    /// Returns the epoch whose updates this reader yields.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Reads the next update payload.
    ///
    /// Returns `Ok(None)` at the end of the log or when a later snapshot is
    /// reached; the reader stays finished after a snapshot.
    ///
    /// # Errors
    ///
    /// - [`StateError::CorruptState`] for a malformed entry or an update
    ///   that belongs to a different epoch
    /// - [`StateError::Log`] for log corruption; the following call resumes
    ///   after the log resynchronizes, so updates may have been lost
    pub fn read(&mut self) -> StateResult<Option<Vec<u8>>> {
        let Some(log) = self.log.as_mut() else {
            return Ok(None);
        };
        let Some(entry) = log.read()? else {
            return Ok(None);
        };
        let offset = log.entry_offset().unwrap_or_default();

        let (header, payload) = into_parts(entry)
            .ok_or_else(|| StateError::corrupt_state(offset, "malformed state entry"))?;
        match header.kind {
            EntryKind::Snapshot => {
                self.log = None;
                Ok(None)
            }
            EntryKind::Update if header.epoch == self.epoch => Ok(Some(payload)),
            EntryKind::Update => Err(StateError::corrupt_state(
                offset,
                format!(
                    "update for epoch {} found in epoch {}",
                    header.epoch, self.epoch
                ),
            )),
        }
    }
}

impl<B: StorageBackend + ?Sized> Iterator for UpdatesReader<'_, B> {
    type Item = StateResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// Reads the single entry starting at `offset`.
fn read_entry_at<'a, B: StorageBackend + ?Sized>(
    log: &mut LogReader<BackendCursor<'a, B>>,
    backend: &'a B,
    offset: u64,
) -> StateResult<(EntryHeader, Vec<u8>)> {
    log.reset(BackendCursor::new(backend, offset), offset);
    let entry = log
        .read()?
        .ok_or_else(|| StateError::corrupt_state(offset, "no entry at offset"))?;
    into_parts(entry).ok_or_else(|| StateError::corrupt_state(offset, "malformed state entry"))
}

/// Restores state from the log stored in `backend`, considering only
/// entries that end at or before `limit`.
///
/// The last complete entry is located with [`rewind`]. If it is a
/// snapshot, that snapshot is the state. If it is an update, the snapshot
/// its epoch pointer references is read instead. Either way at most two
/// entries are read before updates are replayed.
///
/// A log without any complete entry restores as empty state in epoch 0.
///
/// # Example
///
/// ```rust
/// use epochlog_state::{restore, StateWriter};
/// use epochlog_storage::{InMemoryBackend, StorageBackend};
///
/// let mut writer = StateWriter::new(InMemoryBackend::new(), 0, 0);
/// writer.snapshot(b"S1").unwrap();
/// writer.update(b"U1").unwrap();
/// let backend = writer.into_inner();
///
/// let restored = restore(&backend, backend.size().unwrap()).unwrap();
/// assert_eq!(restored.state.as_deref(), Some(&b"S1"[..]));
/// let updates: Vec<_> = restored.updates.collect::<Result<_, _>>().unwrap();
/// assert_eq!(updates, vec![b"U1".to_vec()]);
/// ```
///
/// # Errors
///
/// - [`StateError::CorruptState`] if the last entry or the snapshot it
///   points to is malformed, or the epoch chain is inconsistent
/// - [`StateError::Log`] if either entry cannot be read
pub fn restore<B: StorageBackend + ?Sized>(backend: &B, limit: u64) -> StateResult<Restored<'_, B>> {
    if limit == 0 {
        return Ok(Restored::empty());
    }
    let Some(last) = rewind(backend, limit)? else {
        warn!(limit, "no complete entry in state log, restoring empty state");
        return Ok(Restored::empty());
    };

    let mut log = LogReader::new(BackendCursor::new(backend, last), last);
    let (header, payload) = read_entry_at(&mut log, backend, last)?;

    let (state, epoch) = match header.kind {
        // The log continues right after the snapshot; there are no updates.
        EntryKind::Snapshot => (Some(payload), last),
        EntryKind::Update => {
            let epoch = header.epoch;
            if epoch > last {
                return Err(StateError::corrupt_state(
                    last,
                    format!("update points to later epoch {epoch}"),
                ));
            }
            let (head, payload) =
                read_entry_at(&mut log, backend, epoch).map_err(|err| match err {
                    StateError::Log(e) if e.is_corrupted() || e.is_unexpected_eof() => {
                        StateError::corrupt_state(
                            epoch,
                            "epoch pointer does not reference an entry",
                        )
                    }
                    other => other,
                })?;
            match head.kind {
                // The log is positioned after the snapshot, at its first update.
                EntryKind::Snapshot => (Some(payload), epoch),
                // No snapshot yet: every update since the start of the log
                // belongs to epoch 0.
                EntryKind::Update if epoch == 0 && head.epoch == 0 => {
                    log.reset(BackendCursor::new(backend, 0), 0);
                    (None, 0)
                }
                EntryKind::Update => {
                    return Err(StateError::corrupt_state(
                        epoch,
                        "epoch pointer does not reference a snapshot",
                    ));
                }
            }
        }
    };

    debug!(
        limit,
        last,
        epoch,
        has_snapshot = state.is_some(),
        "restored state"
    );
    Ok(Restored {
        state,
        epoch,
        updates: UpdatesReader {
            log: Some(log),
            epoch,
        },
    })
}

/// Restores state from the whole log stored in `backend`.
///
/// # Errors
///
/// See [`restore`].
pub fn restore_backend<B: StorageBackend + ?Sized>(backend: &B) -> StateResult<Restored<'_, B>> {
    let limit = backend.size()?;
    restore(backend, limit)
}

/// Restores state up to the end of the stream behind `cursor`, leaving the
/// cursor where it was.
///
/// # Errors
///
/// See [`restore`].
pub fn restore_seek<'a, B: StorageBackend + ?Sized>(
    cursor: &mut BackendCursor<'a, B>,
) -> StateResult<Restored<'a, B>> {
    let position = cursor.position();
    let limit = cursor.seek(SeekFrom::End(0))?;
    let restored = restore(cursor.backend(), limit);
    cursor.set_position(position);
    restored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::encode_entry;
    use crate::writer::StateWriter;
    use epochlog_log::LogWriter;
    use epochlog_storage::InMemoryBackend;

    fn collect_updates<B: StorageBackend + ?Sized>(restored: Restored<'_, B>) -> Vec<Vec<u8>> {
        restored.updates.collect::<StateResult<_>>().unwrap()
    }

    #[test]
    fn empty_log_restores_nothing() {
        let backend = InMemoryBackend::new();
        let restored = restore_backend(&backend).unwrap();
        assert!(restored.state.is_none());
        assert_eq!(restored.epoch, 0);
        assert!(collect_updates(restored).is_empty());
    }

    #[test]
    fn snapshot_then_updates() {
        let mut writer = StateWriter::new(InMemoryBackend::new(), 0, 0);
        writer.snapshot(b"S1").unwrap();
        writer.update(b"U1").unwrap();
        writer.update(b"U2").unwrap();
        let backend = writer.into_inner();

        let restored = restore_backend(&backend).unwrap();
        assert_eq!(restored.state.as_deref(), Some(&b"S1"[..]));
        assert_eq!(restored.epoch, 0);
        let mut updates = restored.updates;
        assert_eq!(updates.read().unwrap(), Some(b"U1".to_vec()));
        assert_eq!(updates.read().unwrap(), Some(b"U2".to_vec()));
        assert_eq!(updates.read().unwrap(), None);
    }

    #[test]
    fn last_entry_is_snapshot() {
        let mut writer = StateWriter::new(InMemoryBackend::new(), 0, 0);
        writer.snapshot(b"S1").unwrap();
        writer.update(b"U1").unwrap();
        writer.snapshot(b"S2").unwrap();
        let epoch = writer.epoch();
        let backend = writer.into_inner();

        let restored = restore_backend(&backend).unwrap();
        assert_eq!(restored.state.as_deref(), Some(&b"S2"[..]));
        assert_eq!(restored.epoch, epoch);
        assert!(collect_updates(restored).is_empty());
    }

    #[test]
    fn updates_before_any_snapshot() {
        let mut writer = StateWriter::new(InMemoryBackend::new(), 0, 0);
        writer.update(b"U1").unwrap();
        writer.update(b"U2").unwrap();
        let backend = writer.into_inner();

        let restored = restore_backend(&backend).unwrap();
        assert!(restored.state.is_none());
        assert_eq!(restored.epoch, 0);
        assert_eq!(collect_updates(restored), vec![b"U1".to_vec(), b"U2".to_vec()]);
    }

    #[test]
    fn updates_stop_at_next_snapshot() {
        let mut writer = StateWriter::new(InMemoryBackend::new(), 0, 0);
        writer.snapshot(b"S1").unwrap();
        writer.update(b"U1").unwrap();
        let cut = writer.tell();
        writer.snapshot(b"S2").unwrap();
        writer.update(b"U2").unwrap();
        let backend = writer.into_inner();

        // Restoring up to `cut` ignores the second epoch.
        let restored = restore(&backend, cut).unwrap();
        assert_eq!(restored.state.as_deref(), Some(&b"S1"[..]));
        assert_eq!(collect_updates(restored), vec![b"U1".to_vec()]);
    }

    #[test]
    fn limit_inside_last_entry_uses_previous() {
        let mut writer = StateWriter::new(InMemoryBackend::new(), 0, 0);
        writer.snapshot(b"S1").unwrap();
        writer.update(b"U1").unwrap();
        let backend = writer.into_inner();
        let size = backend.size().unwrap();

        let restored = restore(&backend, size - 1).unwrap();
        assert_eq!(restored.state.as_deref(), Some(&b"S1"[..]));
    }

    #[test]
    fn update_pointing_at_update_is_corrupt() {
        let mut log = LogWriter::new(InMemoryBackend::new(), 0);
        let mut buf = Vec::new();
        encode_entry(&mut buf, EntryKind::Snapshot, 0, b"S");
        log.append(&buf).unwrap();
        encode_entry(&mut buf, EntryKind::Update, 0, b"U");
        let second = log.append(&buf).unwrap();
        encode_entry(&mut buf, EntryKind::Update, second, b"V");
        log.append(&buf).unwrap();
        let backend = log.into_inner();

        let err = restore_backend(&backend).unwrap_err();
        assert!(matches!(err, StateError::CorruptState { offset, .. } if offset == second));
    }

    #[test]
    fn epoch_pointer_into_middle_of_entry_is_corrupt() {
        let mut log = LogWriter::new(InMemoryBackend::new(), 0);
        let mut buf = Vec::new();
        encode_entry(&mut buf, EntryKind::Snapshot, 0, b"S");
        log.append(&buf).unwrap();
        encode_entry(&mut buf, EntryKind::Update, 5, b"U");
        log.append(&buf).unwrap();
        let backend = log.into_inner();

        let err = restore_backend(&backend).unwrap_err();
        assert!(err.is_corruption());
        assert!(matches!(err, StateError::CorruptState { offset: 5, .. }));
    }

    #[test]
    fn malformed_last_entry_is_corrupt() {
        let mut log = LogWriter::new(InMemoryBackend::new(), 0);
        log.append(b"short").unwrap();
        let backend = log.into_inner();
        let err = restore_backend(&backend).unwrap_err();
        assert!(matches!(err, StateError::CorruptState { offset: 0, .. }));
    }

    #[test]
    fn foreign_epoch_update_is_corrupt() {
        let mut log = LogWriter::new(InMemoryBackend::new(), 0);
        let mut buf = Vec::new();
        encode_entry(&mut buf, EntryKind::Snapshot, 0, b"S");
        log.append(&buf).unwrap();
        encode_entry(&mut buf, EntryKind::Update, 999, b"X");
        let stray = log.append(&buf).unwrap();
        encode_entry(&mut buf, EntryKind::Update, 0, b"U");
        log.append(&buf).unwrap();
        let backend = log.into_inner();

        let mut restored = restore_backend(&backend).unwrap();
        match restored.updates.read() {
            Err(StateError::CorruptState { offset, .. }) => assert_eq!(offset, stray),
            other => panic!("expected corrupt state, got {other:?}"),
        }
        assert_eq!(restored.updates.read().unwrap(), Some(b"U".to_vec()));
    }

    #[test]
    fn restore_seek_keeps_position() {
        let mut writer = StateWriter::new(InMemoryBackend::new(), 0, 0);
        writer.snapshot(b"S1").unwrap();
        writer.update(b"U1").unwrap();
        let backend = writer.into_inner();

        let mut cursor = BackendCursor::new(&backend, 3);
        let restored = restore_seek(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 3);
        assert_eq!(restored.state.as_deref(), Some(&b"S1"[..]));
        assert_eq!(collect_updates(restored), vec![b"U1".to_vec()]);
    }
}
