//! State entry header codec.
//!
//! Every log entry written by the state layer starts with a 9 byte header:
//!
//! ```text
//! | kind (1) | epoch (8, little-endian) | payload |
//! ```

/// Size of the state entry header.
pub const ENTRY_HEADER_SIZE: usize = 1 + 8;

/// Kind of a state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryKind {
    /// A delta to apply on top of the epoch's snapshot.
    Update = 1,
    /// A complete state dump that opens a new epoch.
    Snapshot = 2,
}

impl EntryKind {
    /// Converts a byte to an entry kind.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Update),
            2 => Some(Self::Snapshot),
            _ => None,
        }
    }

    /// Converts the entry kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns a lowercase name for display.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Snapshot => "snapshot",
        }
    }
}

/// Decoded state entry header.
///
/// For an update, `epoch` is the offset of the snapshot it applies to. For
/// a snapshot, it is the epoch that was current before the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Entry kind.
    pub kind: EntryKind,
    /// Epoch pointer.
    pub epoch: u64,
}

/// Encodes a state entry into `buf`, replacing its contents.
pub fn encode_entry(buf: &mut Vec<u8>, kind: EntryKind, epoch: u64, payload: &[u8]) {
    buf.clear();
    buf.reserve(ENTRY_HEADER_SIZE + payload.len());
    buf.push(kind.as_byte());
    buf.extend_from_slice(&epoch.to_le_bytes());
    buf.extend_from_slice(payload);
}

/// Splits a log entry into its state header and payload.
///
/// Returns `None` if the entry is shorter than the header or has an unknown
/// kind.
#[must_use]
pub fn decode_entry(entry: &[u8]) -> Option<(EntryHeader, &[u8])> {
    if entry.len() < ENTRY_HEADER_SIZE {
        return None;
    }
    let kind = EntryKind::from_byte(entry[0])?;
    let mut epoch = [0u8; 8];
    epoch.copy_from_slice(&entry[1..ENTRY_HEADER_SIZE]);
    Some((
        EntryHeader {
            kind,
            epoch: u64::from_le_bytes(epoch),
        },
        &entry[ENTRY_HEADER_SIZE..],
    ))
}

/// Like [`decode_entry`], reusing the entry's allocation for the payload.
pub(crate) fn into_parts(mut entry: Vec<u8>) -> Option<(EntryHeader, Vec<u8>)> {
    let (header, _) = decode_entry(&entry)?;
    entry.drain(..ENTRY_HEADER_SIZE);
    Some((header, entry))
}
