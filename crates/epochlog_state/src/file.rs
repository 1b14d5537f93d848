//! File-backed state logs.

use crate::config::Config;
use crate::error::StateResult;
use crate::restore::{restore_backend, Restored};
use crate::writer::StateWriter;
use epochlog_storage::{FileBackend, StorageBackend};
use std::path::Path;
use tracing::debug;

/// A state log stored in a single file.
///
/// The usual sequence on startup is to restore the state, replay its
/// updates, and then turn the file into a writer:
///
/// ```no_run
/// use epochlog_state::{Config, StateFile};
/// use std::path::Path;
///
/// let file = StateFile::open(Path::new("state.log"), &Config::default()).unwrap();
/// let restored = file.restore().unwrap();
/// let mut state = restored.state.unwrap_or_default();
/// for update in restored.updates {
///     state.extend_from_slice(&update.unwrap());
/// }
///
/// let mut writer = file.writer().unwrap();
/// writer.update(b"more").unwrap();
/// ```
#[derive(Debug)]
pub struct StateFile {
    backend: FileBackend,
    config: Config,
}

impl StateFile {
    /// Opens the state log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist and
    /// [`Config::create_if_missing`] is off, or if it cannot be opened.
    pub fn open(path: &Path, config: &Config) -> StateResult<Self> {
        let backend = if config.create_dirs {
            FileBackend::open_with_create_dirs(path)?
        } else if config.create_if_missing {
            FileBackend::open(path)?
        } else {
            FileBackend::open_existing(path)?
        };
        debug!(path = %path.display(), size = backend.size()?, "opened state log");
        Ok(Self {
            backend,
            config: config.clone(),
        })
    }

    /// Restores the state stored in the file.
    ///
    /// # Errors
    ///
    /// See [`crate::restore`].
    pub fn restore(&self) -> StateResult<Restored<'_, FileBackend>> {
        restore_backend(&self.backend)
    }

    /// Turns the file into a writer positioned at its end, in the current
    /// epoch.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be restored.
    pub fn writer(self) -> StateResult<StateWriter<FileBackend>> {
        StateWriter::open_with_config(self.backend, self.config)
    }

    /// Returns the path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.backend.path()
    }

    /// Returns the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &FileBackend {
        &self.backend
    }
}
