//! Crash and corruption simulation.
//!
//! [`FaultyBackend`] stops accepting bytes after a configurable amount,
//! leaving a partially written tail the way an interrupted process would.
//! [`check_crash_recovery`] uses it to check that a state log restores to
//! exactly the operations that completed before the crash.

use crate::integration::{StateModel, StateOp};
use epochlog_state::{Config, StateWriter};
use epochlog_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A storage backend that fails on demand.
///
/// Writes succeed until `crash_after_bytes` bytes have been appended. The
/// write that crosses the threshold lands partially and fails, and every
/// later write fails without landing. Syncs fail while `fail_on_sync` is
/// set. Reads always go to the wrapped data.
#[derive(Debug)]
pub struct FaultyBackend {
    inner: InMemoryBackend,
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

impl FaultyBackend {
    /// Creates an empty backend that never fails.
    pub fn new() -> Self {
        Self::wrap(InMemoryBackend::new())
    }

    /// Wraps existing data. Only bytes appended from now on count toward
    /// the crash threshold.
    pub fn wrap(inner: InMemoryBackend) -> Self {
        Self {
            inner,
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
        }
    }

    /// Crashes once `bytes` more bytes have been appended.
    pub fn crash_after(&self, bytes: usize) {
        self.crash_after_bytes.store(bytes, Ordering::SeqCst);
        self.bytes_written.store(0, Ordering::SeqCst);
    }

    /// Makes every sync fail while `fail` is set.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Clears the crash state and disables further failures.
    pub fn reset(&self) {
        self.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
        self.bytes_written.store(0, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.fail_on_sync.store(false, Ordering::SeqCst);
    }

    /// Returns whether a write has failed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }

    /// Consumes the backend, returning whatever reached it.
    pub fn into_inner(self) -> InMemoryBackend {
        self.inner
    }

    fn fail(&self, what: &str) -> StorageError {
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }
}

impl Default for FaultyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let current = self.bytes_written.fetch_add(data.len(), Ordering::SeqCst);
        let threshold = self.crash_after_bytes.load(Ordering::SeqCst);

        if current >= threshold {
            self.crashed.store(true, Ordering::SeqCst);
            return Err(self.fail("write"));
        }

        if current + data.len() > threshold {
            self.crashed.store(true, Ordering::SeqCst);
            let partial_len = threshold - current;
            if partial_len > 0 {
                let _ = self.inner.append(&data[..partial_len]);
            }
            return Err(self.fail("partial write"));
        }

        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.fail("sync"));
        }
        self.inner.sync()
    }
}

/// Flips every bit of the byte at `offset`.
pub fn flip_byte(data: &mut [u8], offset: usize) {
    data[offset] ^= 0xFF;
}

/// Drops the last `n` bytes, as a write cut short would.
pub fn truncate_tail(data: &mut Vec<u8>, n: usize) {
    data.truncate(data.len().saturating_sub(n));
}

/// Outcome of a crash recovery check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashRecoveryResult {
    /// Number of operations that completed before the crash.
    pub committed: usize,
    /// Number of operations written after reopening over the crash.
    pub resumed: usize,
    /// Whether the crash was actually hit.
    pub crashed: bool,
    /// Whether the restored state matched the committed operations.
    pub passed: bool,
    /// What went wrong, if anything.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    fn failed(committed: usize, resumed: usize, error: String) -> Self {
        Self {
            committed,
            resumed,
            crashed: true,
            passed: false,
            error: Some(error),
        }
    }
}

/// Writes `ops` to a state log that crashes after `crash_after` bytes.
/// The writer is then reopened over the surviving bytes and the remaining
/// operations are written after the torn tail.
///
/// The check passes when the restored snapshot and updates are exactly
/// those of the operations that returned `Ok`, on either side of the crash.
pub fn check_crash_recovery(ops: &[StateOp], crash_after: usize) -> CrashRecoveryResult {
    let backend = FaultyBackend::new();
    backend.crash_after(crash_after);
    let config = Config::default().sync_on_write(false);
    let mut writer = StateWriter::with_config(backend, 0, 0, config.clone());

    let mut model = StateModel::new();
    let mut committed = 0;
    let mut resumed = 0;
    let mut crashed = false;
    for op in ops {
        match op.apply(&mut writer) {
            Ok(()) => {
                model.apply(op);
                if crashed {
                    resumed += 1;
                } else {
                    committed += 1;
                }
            }
            Err(_) if !crashed => {
                crashed = true;
                let survivor = writer.into_inner().into_inner();
                writer = match StateWriter::open_with_config(
                    FaultyBackend::wrap(survivor),
                    config.clone(),
                ) {
                    Ok(writer) => writer,
                    Err(err) => {
                        return CrashRecoveryResult::failed(
                            committed,
                            resumed,
                            format!("reopen after crash: {err}"),
                        )
                    }
                };
            }
            Err(err) => {
                return CrashRecoveryResult::failed(
                    committed,
                    resumed,
                    format!("write after reopen: {err}"),
                )
            }
        }
    }

    let survivor = writer.into_inner().into_inner();
    let (passed, error) = match StateModel::restored(&survivor) {
        Ok(actual) if actual == model => (true, None),
        Ok(actual) => (
            false,
            Some(format!("expected {model:?}, restored {actual:?}")),
        ),
        Err(err) => (false, Some(err.to_string())),
    };

    CrashRecoveryResult {
        committed,
        resumed,
        crashed,
        passed,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::payload;
    use crate::generators::state_ops_strategy;
    use epochlog_log::{LogReader, LogWriter, BLOCK_SIZE};
    use epochlog_state::restore_backend;
    use epochlog_storage::BackendCursor;
    use proptest::prelude::*;

    fn sample_ops() -> Vec<StateOp> {
        vec![
            StateOp::Update(payload(1, 10)),
            StateOp::Snapshot(payload(2, 100)),
            StateOp::Update(payload(3, 20)),
            StateOp::Update(payload(4, 2 * BLOCK_SIZE)),
            StateOp::Snapshot(payload(5, 50)),
            StateOp::Update(payload(6, 30)),
        ]
    }

    #[test]
    fn test_partial_write_lands_prefix() {
        let mut backend = FaultyBackend::new();
        backend.crash_after(5);
        assert!(backend.append(b"0123456789").is_err());
        assert!(backend.has_crashed());
        assert_eq!(backend.inner().data(), b"01234");
        assert!(backend.append(b"more").is_err());
        assert_eq!(backend.size().unwrap(), 5);

        backend.reset();
        backend.append(b"ok").unwrap();
        assert_eq!(backend.size().unwrap(), 7);
    }

    #[test]
    fn test_crash_inside_multi_record_entry() {
        let mut writer = LogWriter::new(FaultyBackend::new(), 0);
        writer.append(b"committed").unwrap();
        writer.backend().crash_after(BLOCK_SIZE + 100);
        assert!(writer.append(&payload(1, 3 * BLOCK_SIZE)).is_err());
        // The next entry goes to a fresh block.
        assert_eq!(writer.tell(), 2 * BLOCK_SIZE as u64);

        let backend = writer.into_inner().into_inner();
        let mut reader = LogReader::new(BackendCursor::new(&backend, 0), 0);
        assert_eq!(reader.read().unwrap().as_deref(), Some(&b"committed"[..]));
        // The torn middle record fails to parse; nothing follows it.
        assert!(reader.read().unwrap_err().is_corrupted());
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn test_sweep_crash_points() {
        let ops = sample_ops();
        let total = {
            let backend = crate::fixtures::scenarios::state_log(&ops);
            backend.size().unwrap() as usize
        };

        let mut crash_after = 0;
        while crash_after <= total {
            let result = check_crash_recovery(&ops, crash_after);
            assert!(
                result.passed,
                "crash after {crash_after} bytes: {:?}",
                result.error
            );
            crash_after += 997;
        }

        let result = check_crash_recovery(&ops, total);
        assert!(result.passed);
        assert!(!result.crashed);
        assert_eq!(result.committed, ops.len());
    }

    #[test]
    fn test_resume_after_crash() {
        let backend = FaultyBackend::new();
        let mut writer = StateWriter::new(backend, 0, 0);
        writer.snapshot(b"S1").unwrap();
        writer.update(b"u1").unwrap();
        writer.backend().crash_after(20);
        assert!(writer.update(&payload(9, 500)).is_err());

        // Reopen over the torn tail and keep writing small updates.
        let survivor = writer.into_inner().into_inner();
        let mut writer = StateWriter::open(survivor).unwrap();
        writer.update(b"u2").unwrap();
        writer.update(b"u3").unwrap();
        let epoch = writer.epoch();
        let backend = writer.into_inner();
        // Each small update is a 26 byte record in the block after the tear.
        assert_eq!(backend.size().unwrap(), BLOCK_SIZE as u64 + 2 * 26);

        let restored = restore_backend(&backend).unwrap();
        assert_eq!(restored.epoch, epoch);
        assert_eq!(restored.epoch, 0);

        let model = StateModel::restored(&backend).unwrap();
        assert_eq!(model.state.as_deref(), Some(&b"S1"[..]));
        assert_eq!(
            model.updates,
            vec![b"u1".to_vec(), b"u2".to_vec(), b"u3".to_vec()]
        );
    }

    #[test]
    fn test_write_on_after_failed_append() {
        let mut writer = StateWriter::new(FaultyBackend::new(), 0, 0);
        writer.snapshot(b"S1").unwrap();
        writer.backend().crash_after(20);
        assert!(writer.update(&payload(9, 500)).is_err());

        // Same writer, storage healthy again.
        writer.backend().reset();
        writer.update(b"u2").unwrap();

        let model = StateModel::restored(writer.backend()).unwrap();
        assert_eq!(model.state.as_deref(), Some(&b"S1"[..]));
        assert_eq!(model.updates, vec![b"u2".to_vec()]);
    }

    #[test]
    fn test_crash_recovery_writes_after_reopen() {
        let ops = sample_ops();
        // Crash inside the first snapshot.
        let result = check_crash_recovery(&ops, 50);
        assert!(result.passed, "{:?}", result.error);
        assert!(result.crashed);
        assert_eq!(result.committed, 1);
        assert_eq!(result.resumed, ops.len() - 2);
    }

    #[test]
    fn test_failed_sync_keeps_entry() {
        let backend = FaultyBackend::new();
        backend.set_fail_on_sync(true);
        let mut writer = StateWriter::new(backend, 0, 0);
        assert!(writer.snapshot(b"S").is_err());
        assert!(writer.update(b"u").is_err());
        assert!(!writer.backend().has_crashed());

        let model = StateModel::restored(writer.backend()).unwrap();
        assert_eq!(model.state.as_deref(), Some(&b"S"[..]));
        assert_eq!(model.updates, vec![b"u".to_vec()]);
    }

    #[test]
    fn test_corruption_helpers() {
        let mut data = vec![0u8, 1, 2, 3];
        flip_byte(&mut data, 1);
        assert_eq!(data, vec![0, 0xFE, 2, 3]);
        truncate_tail(&mut data, 3);
        assert_eq!(data, vec![0]);
        truncate_tail(&mut data, 10);
        assert!(data.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_crash_anywhere_restores_committed(
            ops in state_ops_strategy(1..12),
            fraction in 0.0f64..1.0,
        ) {
            let total = crate::fixtures::scenarios::state_log(&ops).size().unwrap();
            let crash_after = (total as f64 * fraction) as usize;
            let result = check_crash_recovery(&ops, crash_after);
            prop_assert!(result.passed, "{:?}", result.error);
        }
    }
}
