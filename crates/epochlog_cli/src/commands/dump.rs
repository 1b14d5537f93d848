//! Dump command implementation.

use crate::Format;
use epochlog_log::{LogError, LogReader};
use epochlog_state::decode_entry;
use epochlog_storage::{BackendCursor, StorageBackend};
use serde::Serialize;
use std::path::Path;

/// One line of dump output.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DumpEvent {
    /// A complete entry.
    Entry {
        /// Offset of the entry's first record.
        offset: u64,
        /// Entry size in bytes.
        size: usize,
        /// State entry kind (with `--state`).
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        /// State entry epoch pointer (with `--state`).
        #[serde(skip_serializing_if = "Option::is_none")]
        epoch: Option<u64>,
    },
    /// A corrupt record; the reader skipped ahead.
    Corrupted {
        /// Offset of the corrupt record.
        offset: u64,
    },
    /// The log ends inside an entry.
    TornTail {
        /// Offset of the incomplete entry.
        offset: u64,
    },
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    start_offset: u64,
    limit: Option<usize>,
    format: Format,
    state: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = super::open_log(path)?;
    let events = read_events(&backend, start_offset, limit, state)?;

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        Format::Text => print_text_output(&events),
    }

    Ok(())
}

/// Reads up to `limit` entries starting at `start_offset`, recording
/// corruption along the way.
pub fn read_events<B: StorageBackend + ?Sized>(
    backend: &B,
    start_offset: u64,
    limit: Option<usize>,
    state: bool,
) -> Result<Vec<DumpEvent>, Box<dyn std::error::Error>> {
    let mut reader = LogReader::new(BackendCursor::new(backend, start_offset), start_offset);
    let max_entries = limit.unwrap_or(usize::MAX);
    let mut entries = 0;
    let mut events = Vec::new();

    while entries < max_entries {
        match reader.read() {
            Ok(Some(entry)) => {
                let offset = reader.entry_offset().unwrap_or(start_offset);
                let (kind, epoch) = match (state, decode_entry(&entry)) {
                    (false, _) => (None, None),
                    (true, Some((header, _))) => {
                        (Some(header.kind.name().to_string()), Some(header.epoch))
                    }
                    (true, None) => (Some("invalid".to_string()), None),
                };
                events.push(DumpEvent::Entry {
                    offset,
                    size: entry.len(),
                    kind,
                    epoch,
                });
                entries += 1;
            }
            Ok(None) => {
                // A corrupt record running past the end is a torn write.
                if let Some(&DumpEvent::Corrupted { offset }) = events.last() {
                    if super::verify::cut_short(backend, offset, backend.size()?)? {
                        events.pop();
                        events.push(DumpEvent::TornTail { offset });
                    }
                }
                break;
            }
            Err(LogError::Corrupted { offset }) => events.push(DumpEvent::Corrupted { offset }),
            Err(LogError::UnexpectedEof { offset }) => {
                events.push(DumpEvent::TornTail { offset });
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(events)
}

fn print_text_output(events: &[DumpEvent]) {
    println!("Log Entries");
    println!("===========");
    println!();

    for event in events {
        match event {
            DumpEvent::Entry {
                offset,
                size,
                kind,
                epoch,
            } => {
                print!("[{:010}] entry {:>8} bytes", offset, size);
                if let Some(kind) = kind {
                    print!(" {:8}", kind);
                }
                if let Some(epoch) = epoch {
                    print!(" epoch={}", epoch);
                }
                println!();
            }
            DumpEvent::Corrupted { offset } => {
                println!("[{:010}] CORRUPTED (skipping to next block)", offset);
            }
            DumpEvent::TornTail { offset } => {
                println!("[{:010}] TORN TAIL (incomplete entry)", offset);
            }
        }
    }
}
