//! State log configuration.

/// Configuration for writing and opening state logs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to sync the backend after every snapshot and update
    /// (safer but slower).
    pub sync_on_write: bool,

    /// Whether [`crate::StateFile::open`] creates a missing file.
    pub create_if_missing: bool,

    /// Whether [`crate::StateFile::open`] creates missing parent directories.
    pub create_dirs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            create_if_missing: true,
            create_dirs: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync after every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether to create the file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to create missing parent directories.
    #[must_use]
    pub const fn create_dirs(mut self, value: bool) -> Self {
        self.create_dirs = value;
        self
    }
}
