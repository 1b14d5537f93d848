//! Verify command implementation.

use epochlog_log::{rewind, LogError, LogReader, HEADER_SIZE};
use epochlog_storage::{BackendCursor, StorageBackend};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct VerifyResult {
    /// Number of complete entries read.
    pub entries: usize,
    /// Total payload bytes of complete entries.
    pub bytes: u64,
    /// Offsets at which corrupt records were found.
    pub corrupted: Vec<u64>,
    /// Offset of an entry cut short by the end of the log.
    pub torn_tail: Option<u64>,
    /// Offset of the last complete entry found by a sequential scan.
    pub last_entry: Option<u64>,
    /// Offset of the last complete entry found by rewinding from the end.
    pub rewound_entry: Option<u64>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.corrupted.is_empty() && self.last_entry == self.rewound_entry
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying log at {:?}", path);
    println!();

    let backend = super::open_log(path)?;
    let result = verify_log(&backend)?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Log verification passed");
        Ok(())
    } else {
        println!("✗ Log verification failed");
        Err("Verification failed".into())
    }
}

/// Scans the whole log and cross-checks the scan against [`rewind`].
///
/// A corrupt record that is the last thing in the log and runs past its
/// end is reported as a torn tail, like an entry cut short.
pub fn verify_log<B: StorageBackend + ?Sized>(
    backend: &B,
) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let size = backend.size()?;
    let mut result = VerifyResult::default();
    let mut reader = LogReader::new(BackendCursor::new(backend, 0), 0);
    let mut pending: Option<u64> = None;

    loop {
        match reader.read() {
            Ok(Some(entry)) => {
                result.corrupted.extend(pending.take());
                result.entries += 1;
                result.bytes += entry.len() as u64;
                result.last_entry = reader.entry_offset();
            }
            Ok(None) => {
                if let Some(offset) = pending.take() {
                    if cut_short(backend, offset, size)? {
                        result.torn_tail = Some(offset);
                    } else {
                        result.corrupted.push(offset);
                    }
                }
                break;
            }
            Err(LogError::Corrupted { offset }) => {
                result.corrupted.extend(pending.replace(offset));
            }
            Err(LogError::UnexpectedEof { offset }) => {
                result.corrupted.extend(pending.take());
                result.torn_tail = Some(offset);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    result.rewound_entry = rewind(backend, size)?;
    Ok(result)
}

/// Returns true if the record at `offset` claims more bytes than the log
/// holds after it.
pub(crate) fn cut_short<B: StorageBackend + ?Sized>(
    backend: &B,
    offset: u64,
    size: u64,
) -> Result<bool, Box<dyn std::error::Error>> {
    let available = size.saturating_sub(offset);
    if available < HEADER_SIZE as u64 {
        return Ok(true);
    }
    let header = backend.read_at(offset, HEADER_SIZE)?;
    // checksum u32 | type u8 | len u16
    let len = u16::from_le_bytes([header[5], header[6]]);
    Ok(available < (HEADER_SIZE + usize::from(len)) as u64)
}

fn print_result(result: &VerifyResult) {
    println!("  Entries: {}", result.entries);
    println!("  Payload bytes: {}", result.bytes);
    println!("  Corrupt records: {}", result.corrupted.len());
    for offset in &result.corrupted {
        println!("    - corrupt record at offset {}", offset);
    }
    if let Some(offset) = result.torn_tail {
        println!("  Torn tail: incomplete entry at offset {}", offset);
    }
    if result.last_entry != result.rewound_entry {
        println!(
            "  Last entry mismatch: scan found {:?}, rewind found {:?}",
            result.last_entry, result.rewound_entry
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epochlog_log::LogWriter;
    use epochlog_storage::{FileBackend, InMemoryBackend};
    use tempfile::tempdir;

    #[test]
    fn clean_log_verifies() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clean.log");
        let mut writer = LogWriter::open(FileBackend::open(&path).unwrap()).unwrap();
        writer.append(b"one").unwrap();
        let last = writer.append(&[2u8; 50_000]).unwrap();
        writer.sync().unwrap();

        let result = verify_log(writer.backend()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.entries, 2);
        assert_eq!(result.bytes, 50_003);
        assert_eq!(result.last_entry, Some(last));
        assert_eq!(result.rewound_entry, Some(last));
    }

    #[test]
    fn corruption_fails_verification() {
        let mut writer = LogWriter::new(InMemoryBackend::new(), 0);
        writer.append(b"one").unwrap();
        let bad = writer.append(b"two").unwrap();
        let mut data = writer.into_inner().into_data();
        data[bad as usize + HEADER_SIZE] ^= 0xFF;
        let backend = InMemoryBackend::with_data(data);

        let result = verify_log(&backend).unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.corrupted, vec![bad]);
        assert_eq!(result.entries, 1);
    }

    #[test]
    fn truncated_last_record_is_a_torn_tail() {
        let mut writer = LogWriter::new(InMemoryBackend::new(), 0);
        let first = writer.append(b"one").unwrap();
        let last = writer.append(&[2u8; 40]).unwrap();
        let mut data = writer.into_inner().into_data();
        data.truncate(data.len() - 3);
        let backend = InMemoryBackend::with_data(data);

        let result = verify_log(&backend).unwrap();
        assert!(result.is_ok());
        assert!(result.corrupted.is_empty());
        assert_eq!(result.torn_tail, Some(last));
        assert_eq!(result.entries, 1);
        assert_eq!(result.last_entry, Some(first));
        assert_eq!(result.rewound_entry, Some(first));
    }

    #[test]
    fn entries_after_a_torn_write_still_verify() {
        let mut writer = LogWriter::new(InMemoryBackend::new(), 0);
        writer.append(b"one").unwrap();
        let torn = writer.append(&[7u8; 500]).unwrap();
        let mut data = writer.into_inner().into_data();
        data.truncate(data.len() - 400);

        let mut writer = LogWriter::open(InMemoryBackend::with_data(data)).unwrap();
        let last = writer.append(b"three").unwrap();

        let result = verify_log(writer.backend()).unwrap();
        assert_eq!(result.corrupted, vec![torn]);
        assert_eq!(result.torn_tail, None);
        assert_eq!(result.entries, 2);
        assert_eq!(result.last_entry, Some(last));
        assert_eq!(result.rewound_entry, Some(last));
    }
}
