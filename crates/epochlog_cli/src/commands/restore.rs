//! Restore command implementation.

use crate::Format;
use epochlog_state::{restore_backend, StateError};
use epochlog_storage::StorageBackend;
use serde::Serialize;
use std::path::Path;

/// Summary of a restored state log.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    /// Current epoch (offset of the latest snapshot, or 0).
    pub epoch: u64,
    /// Size of the latest snapshot, if there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_size: Option<usize>,
    /// Number of updates replayed on top of the snapshot.
    pub updates: usize,
    /// Total size of those updates.
    pub update_bytes: u64,
    /// Errors hit while reading updates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Runs the restore command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let backend = super::open_log(path)?;
    let summary = summarize(&backend)?;

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Format::Text => {
            println!("State log: {:?}", path);
            println!("  Epoch: {}", summary.epoch);
            match summary.snapshot_size {
                Some(size) => println!("  Snapshot: {} bytes", size),
                None => println!("  Snapshot: none"),
            }
            println!(
                "  Updates: {} ({} bytes)",
                summary.updates, summary.update_bytes
            );
            for err in &summary.errors {
                println!("  Error: {}", err);
            }
        }
    }

    Ok(())
}

/// Restores the log and replays its updates, counting them.
///
/// Log corruption while reading updates is recorded and skipped, like the
/// reader itself does; inconsistent state entries stop the replay.
pub fn summarize<B: StorageBackend + ?Sized>(backend: &B) -> Result<RestoreSummary, StateError> {
    let restored = restore_backend(backend)?;
    let mut summary = RestoreSummary {
        epoch: restored.epoch,
        snapshot_size: restored.state.as_ref().map(Vec::len),
        ..RestoreSummary::default()
    };

    let mut updates = restored.updates;
    loop {
        match updates.read() {
            Ok(Some(update)) => {
                summary.updates += 1;
                summary.update_bytes += update.len() as u64;
            }
            Ok(None) => break,
            Err(StateError::Log(err)) if err.is_corrupted() => summary.errors.push(err.to_string()),
            Err(err) => {
                summary.errors.push(err.to_string());
                break;
            }
        }
    }

    Ok(summary)
}
