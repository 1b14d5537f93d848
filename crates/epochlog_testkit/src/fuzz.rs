//! Fuzz targets for the log and state layers.
//!
//! Each target accepts arbitrary bytes and must never panic or loop. They
//! can be driven by cargo-fuzz or by the seeded tests below.

use crate::integration::{StateHarness, StateOp};
use epochlog_log::{rewind, LogReader};
use epochlog_state::restore_backend;
use epochlog_storage::{BackendCursor, InMemoryBackend, StorageBackend};

/// Reads every entry of an arbitrary byte stream, resynchronizing past
/// corruption. Returns the number of complete entries.
pub fn fuzz_log_reader(data: &[u8]) -> usize {
    let backend = InMemoryBackend::with_data(data.to_vec());
    let mut reader = LogReader::new(BackendCursor::new(&backend, 0), 0);
    let mut entries = 0;

    // Every entry or error moves the reader forward by at least a byte.
    for _ in 0..=data.len() {
        match reader.read() {
            Ok(Some(_)) => entries += 1,
            Ok(None) => return entries,
            Err(err) if err.is_corrupted() => {}
            Err(_) => return entries,
        }
    }
    panic!("log reader did not finish {} bytes", data.len());
}

/// Walks an arbitrary byte stream backwards with [`rewind`]. Returns the
/// offsets found, newest first.
pub fn fuzz_rewind(data: &[u8]) -> Vec<u64> {
    let backend = InMemoryBackend::with_data(data.to_vec());
    let mut found = Vec::new();
    let mut limit = data.len() as u64;

    while let Some(offset) = rewind(&backend, limit).unwrap_or(None) {
        assert!(offset < limit, "rewind from {limit} returned {offset}");
        found.push(offset);
        limit = offset;
    }
    found
}

/// Restores an arbitrary byte stream as a state log and drains its
/// updates. Returns the number of updates read.
pub fn fuzz_restore(data: &[u8]) -> usize {
    let backend = InMemoryBackend::with_data(data.to_vec());
    let Ok(restored) = restore_backend(&backend) else {
        return 0;
    };
    assert!(restored.epoch <= backend.size().unwrap_or(0));

    let mut updates = restored.updates;
    let mut count = 0;
    for _ in 0..=data.len() {
        match updates.read() {
            Ok(Some(_)) => count += 1,
            Ok(None) => return count,
            Err(err) if err.is_corruption() => {}
            Err(_) => return count,
        }
    }
    panic!("updates reader did not finish {} bytes", data.len());
}

/// Interprets bytes as state operations, writes them and checks that
/// the log restores to the same state.
///
/// Each operation takes two bytes: the low bit of the first selects a
/// snapshot or an update, and the second is the payload length.
pub fn fuzz_state_ops(data: &[u8]) {
    let mut harness = StateHarness::new();
    for (i, pair) in data.chunks_exact(2).enumerate() {
        let payload = vec![i as u8; pair[1] as usize];
        let op = if pair[0] & 1 == 1 {
            StateOp::Snapshot(payload)
        } else {
            StateOp::Update(payload)
        };
        harness.apply(&op);
        if pair[0] & 0x80 != 0 {
            harness.reopen();
        }
    }
    harness.verify();
}
