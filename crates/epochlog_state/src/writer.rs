//! State writer: snapshots and updates tagged with their epoch.

use crate::config::Config;
use crate::entry::{encode_entry, EntryKind};
use crate::error::StateResult;
use crate::restore::restore_backend;
use epochlog_log::LogWriter;
use epochlog_storage::StorageBackend;
use tracing::warn;

/// Appends snapshots and updates to a state log.
///
/// Each snapshot opens a new epoch, identified by the snapshot's offset in
/// the log. Updates carry the current epoch so that [`crate::restore`]
/// only replays updates against the snapshot they were written for.
///
/// A single writer must own the log; concurrent writers corrupt it.
///
/// # Example
///
/// ```rust
/// use epochlog_state::StateWriter;
/// use epochlog_storage::InMemoryBackend;
///
/// let mut writer = StateWriter::new(InMemoryBackend::new(), 0, 0);
/// writer.update(b"before any snapshot").unwrap();
/// let next = writer.tell();
/// writer.snapshot(b"full state").unwrap();
/// assert_eq!(writer.epoch(), next);
/// ```
#[derive(Debug)]
pub struct StateWriter<B: StorageBackend> {
    log: LogWriter<B>,
    epoch: u64,
    config: Config,
    scratch: Vec<u8>,
}

impl<B: StorageBackend> StateWriter<B> {
    /// Creates a writer for a backend that ends at `offset`, in `epoch`.
    pub fn new(backend: B, offset: u64, epoch: u64) -> Self {
        Self::with_config(backend, offset, epoch, Config::default())
    }

    /// Creates a writer with an explicit configuration.
    pub fn with_config(backend: B, offset: u64, epoch: u64, config: Config) -> Self {
        Self {
            log: LogWriter::new(backend, offset),
            epoch,
            config,
            scratch: Vec::new(),
        }
    }

    /// Opens a writer that continues an existing log.
    ///
    /// The log is restored first to find the current epoch, and the writer
    /// is positioned at the end of the backend. If the log ends in a torn
    /// write, the next entry starts on a fresh block.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be restored.
    pub fn open(backend: B) -> StateResult<Self> {
        Self::open_with_config(backend, Config::default())
    }

    /// Opens a writer that continues an existing log, with an explicit
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be restored.
    pub fn open_with_config(backend: B, config: Config) -> StateResult<Self> {
        let epoch = restore_backend(&backend)?.epoch;
        Ok(Self {
            log: LogWriter::open(backend)?,
            epoch,
            config,
            scratch: Vec::new(),
        })
    }

    /// Appends a snapshot and makes it the current epoch.
    ///
    /// The snapshot records the previous epoch; every later update records
    /// this snapshot's offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the append or the sync fails. After a sync
    /// failure the snapshot may or may not be durable.
    pub fn snapshot(&mut self, snapshot: &[u8]) -> StateResult<()> {
        let off = self.append(EntryKind::Snapshot, snapshot)?;
        self.epoch = off;
        self.sync_if_configured()
    }

    /// Appends an update to the current epoch.
    ///
    /// # Errors
    ///
    /// Returns an error if the append or the sync fails.
    pub fn update(&mut self, update: &[u8]) -> StateResult<()> {
        self.append(EntryKind::Update, update)?;
        self.sync_if_configured()
    }

    fn append(&mut self, kind: EntryKind, payload: &[u8]) -> StateResult<u64> {
        encode_entry(&mut self.scratch, kind, self.epoch, payload);
        Ok(self.log.append(&self.scratch)?)
    }

    fn sync_if_configured(&mut self) -> StateResult<()> {
        if !self.config.sync_on_write {
            return Ok(());
        }
        self.log.sync().map_err(|err| {
            warn!(epoch = self.epoch, error = %err, "state log sync failed");
            err.into()
        })
    }

    /// Commits appended entries to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend sync fails.
    pub fn sync(&mut self) -> StateResult<()> {
        Ok(self.log.sync()?)
    }

    /// Returns the current epoch: the offset of the latest snapshot, or 0.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the offset at which the next entry will start.
    #[must_use]
    pub fn tell(&self) -> u64 {
        self.log.tell()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        self.log.backend()
    }

    /// Consumes the writer, returning the backend.
    pub fn into_inner(self) -> B {
        self.log.into_inner()
    }
}
