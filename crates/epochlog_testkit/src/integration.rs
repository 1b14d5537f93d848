//! Cross-crate integration test helpers.
//!
//! [`StateModel`] is what a state log should restore to, and
//! [`StateHarness`] drives a [`StateWriter`] and a model side by side.

use epochlog_state::{restore_backend, StateError, StateResult, StateWriter};
use epochlog_storage::{InMemoryBackend, StorageBackend};

/// An operation on a state log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateOp {
    /// Append a snapshot, starting a new epoch.
    Snapshot(Vec<u8>),
    /// Append an update to the current epoch.
    Update(Vec<u8>),
}

impl StateOp {
    /// Applies the operation to a writer.
    pub fn apply<B: StorageBackend>(&self, writer: &mut StateWriter<B>) -> StateResult<()> {
        match self {
            StateOp::Snapshot(data) => writer.snapshot(data),
            StateOp::Update(data) => writer.update(data),
        }
    }
}

/// The contents of the current epoch: the latest snapshot and the updates
/// appended after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateModel {
    /// Latest snapshot, `None` before the first one.
    pub state: Option<Vec<u8>>,
    /// Updates since the latest snapshot, in order.
    pub updates: Vec<Vec<u8>>,
}

impl StateModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the model a sequence of operations leads to.
    pub fn from_ops<'a>(ops: impl IntoIterator<Item = &'a StateOp>) -> Self {
        let mut model = Self::new();
        for op in ops {
            model.apply(op);
        }
        model
    }

    /// Applies one operation.
    pub fn apply(&mut self, op: &StateOp) {
        match op {
            StateOp::Snapshot(data) => {
                self.state = Some(data.clone());
                self.updates.clear();
            }
            StateOp::Update(data) => self.updates.push(data.clone()),
        }
    }

    /// Restores `backend` and collects its snapshot and updates.
    ///
    /// An entry cut short by the end of the log ends the updates, and
    /// corrupt records are skipped, as a recovering application would.
    pub fn restored<B: StorageBackend + ?Sized>(backend: &B) -> StateResult<Self> {
        let restored = restore_backend(backend)?;
        let mut model = Self {
            state: restored.state,
            updates: Vec::new(),
        };

        let mut updates = restored.updates;
        loop {
            match updates.read() {
                Ok(Some(update)) => model.updates.push(update),
                Ok(None) => break,
                Err(StateError::Log(err)) if err.is_unexpected_eof() => break,
                Err(StateError::Log(err)) if err.is_corrupted() => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(model)
    }
}

/// A state writer over memory, checked against a [`StateModel`].
pub struct StateHarness {
    writer: StateWriter<InMemoryBackend>,
    model: StateModel,
}

impl StateHarness {
    /// Creates a harness over an empty log.
    pub fn new() -> Self {
        Self {
            writer: StateWriter::new(InMemoryBackend::new(), 0, 0),
            model: StateModel::new(),
        }
    }

    /// Applies an operation to both the log and the model.
    pub fn apply(&mut self, op: &StateOp) {
        op.apply(&mut self.writer).expect("Failed to write state op");
        self.model.apply(op);
    }

    /// Appends a snapshot.
    pub fn snapshot(&mut self, data: &[u8]) {
        self.apply(&StateOp::Snapshot(data.to_vec()));
    }

    /// Appends an update.
    pub fn update(&mut self, data: &[u8]) {
        self.apply(&StateOp::Update(data.to_vec()));
    }

    /// Replaces the writer with one reopened from the log contents.
    pub fn reopen(&mut self) {
        let placeholder = StateWriter::new(InMemoryBackend::new(), 0, 0);
        let backend = std::mem::replace(&mut self.writer, placeholder).into_inner();
        self.writer = StateWriter::open(backend).expect("Failed to reopen state log");
    }

    /// Restores the log and asserts that it matches the model.
    pub fn verify(&self) {
        let restored =
            restore_backend(self.writer.backend()).expect("Failed to restore state log");
        assert_eq!(restored.epoch, self.writer.epoch(), "Epoch mismatch");

        let actual = StateModel::restored(self.writer.backend()).expect("Failed to read updates");
        assert_eq!(actual, self.model, "Restored state mismatch");
    }

    /// Returns the model.
    pub fn model(&self) -> &StateModel {
        &self.model
    }

    /// Returns the writer.
    pub fn writer(&self) -> &StateWriter<InMemoryBackend> {
        &self.writer
    }
}

impl Default for StateHarness {
    fn default() -> Self {
        Self::new()
    }
}
