//! Test fixtures and log helpers.
//!
//! Provides temporary log files, deterministic payloads and a few
//! ready-made logs for common test scenarios.

use epochlog_log::LogWriter;
use epochlog_state::{Config, StateFile};
use epochlog_storage::{FileBackend, InMemoryBackend};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A log file in a temporary directory, removed on drop.
pub struct TestLog {
    path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestLog {
    /// Creates a path for a new log file. The file itself is not created.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: temp_dir.path().join("test.log"),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file as a state log.
    pub fn state_file(&self, config: &Config) -> StateFile {
        StateFile::open(&self.path, config).expect("Failed to open state file")
    }

    /// Opens a plain log writer positioned at the end of the file.
    pub fn log_writer(&self) -> LogWriter<FileBackend> {
        let backend = FileBackend::open(&self.path).expect("Failed to open log file");
        LogWriter::open(backend).expect("Failed to read log size")
    }

    /// Returns the raw bytes of the file.
    pub fn contents(&self) -> Vec<u8> {
        std::fs::read(&self.path).expect("Failed to read log file")
    }

    /// Replaces the file contents, e.g. with a corrupted copy.
    pub fn overwrite(&self, data: &[u8]) {
        std::fs::write(&self.path, data).expect("Failed to write log file");
    }
}

impl Default for TestLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with the path of a fresh log file.
///
/// The directory holding the file is removed after the test completes.
///
/// # Example
///
/// ```rust,ignore
/// use epochlog_testkit::with_temp_log;
///
/// #[test]
/// fn my_test() {
///     with_temp_log(|path| {
///         let file = StateFile::open(path, &Config::default()).unwrap();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_temp_log<F, R>(f: F) -> R
where
    F: FnOnce(&Path) -> R,
{
    let log = TestLog::new();
    f(log.path())
}

/// Returns `len` pseudo-random bytes derived from `seed`.
///
/// The same seed always yields the same bytes, so failures reproduce.
pub fn payload(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    buf
}

/// Common test scenarios.
pub mod scenarios {
    use super::*;
    use crate::integration::StateOp;
    use epochlog_log::{BLOCK_SIZE, HEADER_SIZE, MAX_RECORD_DATA};
    use epochlog_state::StateWriter;

    /// Writes one entry per size, with payloads from [`payload`] seeded by
    /// the entry index. Returns the log and the entries' offsets.
    pub fn log_with_entries(sizes: &[usize]) -> (InMemoryBackend, Vec<u64>) {
        let mut writer = LogWriter::new(InMemoryBackend::new(), 0);
        let offsets = sizes
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                writer
                    .append(&payload(i as u64, len))
                    .expect("Failed to append entry")
            })
            .collect();
        (writer.into_inner(), offsets)
    }

    /// Entry sizes that land record boundaries on or next to block
    /// boundaries.
    pub fn boundary_sizes() -> Vec<usize> {
        vec![
            0,
            1,
            MAX_RECORD_DATA - HEADER_SIZE - 1,
            MAX_RECORD_DATA - HEADER_SIZE,
            MAX_RECORD_DATA - 1,
            MAX_RECORD_DATA,
            MAX_RECORD_DATA + 1,
            BLOCK_SIZE,
            2 * MAX_RECORD_DATA,
            3 * BLOCK_SIZE + 7,
        ]
    }

    /// Writes `ops` to a fresh state log.
    pub fn state_log(ops: &[StateOp]) -> InMemoryBackend {
        let mut writer = StateWriter::new(InMemoryBackend::new(), 0, 0);
        for op in ops {
            op.apply(&mut writer).expect("Failed to write state op");
        }
        writer.into_inner()
    }
}
