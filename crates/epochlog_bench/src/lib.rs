//! Benchmark utilities.

use epochlog_log::LogWriter;
use epochlog_state::StateWriter;
use epochlog_storage::InMemoryBackend;
use rand::Rng;

/// Generate random entry data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Build an in-memory log of `count` entries of `size` bytes each.
pub fn build_log(count: usize, size: usize) -> InMemoryBackend {
    let data = random_data(size);
    let mut writer = LogWriter::new(InMemoryBackend::new(), 0);
    for _ in 0..count {
        writer.append(&data).expect("append to memory cannot fail");
    }
    writer.into_inner()
}

/// Build a state log with a snapshot of `snapshot_size` bytes followed by
/// `updates` updates of `update_size` bytes.
pub fn build_state_log(snapshot_size: usize, updates: usize, update_size: usize) -> InMemoryBackend {
    let mut writer = StateWriter::new(InMemoryBackend::new(), 0, 0);
    writer
        .snapshot(&random_data(snapshot_size))
        .expect("snapshot to memory cannot fail");
    let update = random_data(update_size);
    for _ in 0..updates {
        writer.update(&update).expect("update to memory cannot fail");
    }
    writer.into_inner()
}
