//! Rewind command implementation.

use epochlog_log::{rewind, LogReader};
use epochlog_storage::{BackendCursor, StorageBackend};
use std::path::Path;

/// Runs the rewind command.
pub fn run(
    path: &Path,
    limit: Option<u64>,
    count: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = super::open_log(path)?;
    let limit = match limit {
        Some(limit) => limit,
        None => backend.size()?,
    };

    let entries = walk_back(&backend, limit, count.unwrap_or(usize::MAX))?;
    println!("Entries before offset {} ({} shown, newest first)", limit, entries.len());
    println!("================");
    for (offset, size) in entries {
        match size {
            Some(size) => println!("[{:010}] {:>8} bytes", offset, size),
            None => println!("[{:010}] unreadable", offset),
        }
    }

    Ok(())
}

/// Rewinds from `limit` up to `max` times, returning each entry's offset
/// and, when it reads back cleanly, its size.
pub fn walk_back<B: StorageBackend + ?Sized>(
    backend: &B,
    limit: u64,
    max: usize,
) -> Result<Vec<(u64, Option<usize>)>, Box<dyn std::error::Error>> {
    let mut entries = Vec::new();
    let mut limit = limit;

    while entries.len() < max {
        let Some(offset) = rewind(backend, limit)? else {
            break;
        };
        let mut reader = LogReader::new(BackendCursor::new(backend, offset), offset);
        let size = reader.read().ok().flatten().map(|entry| entry.len());
        entries.push((offset, size));
        limit = offset;
    }

    Ok(entries)
}
