//! CLI command implementations.

pub mod dump;
pub mod restore;
pub mod rewind;
pub mod verify;

use epochlog_storage::FileBackend;
use std::path::Path;

/// Opens an existing log file. Commands never append to it.
pub(crate) fn open_log(path: &Path) -> Result<FileBackend, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("log file not found: {}", path.display()).into());
    }
    Ok(FileBackend::open_existing(path)?)
}
