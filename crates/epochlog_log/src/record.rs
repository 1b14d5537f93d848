//! Physical record layout and codec.

use std::ops::Range;
use xxhash_rust::xxh64::xxh64;

/// Size of the blocks a log stream is divided into.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Size of a record header.
/// checksum (4) + type (1) + length (2) + entry offset (8) = 15 bytes
pub const HEADER_SIZE: usize = 4 + 1 + 2 + 8;

/// Largest amount of entry data a single record can carry.
pub const MAX_RECORD_DATA: usize = BLOCK_SIZE - HEADER_SIZE;

/// Type of a physical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    /// The record holds a complete entry.
    Full = 1,
    /// The record begins a multi-record entry.
    First = 2,
    /// The record continues a multi-record entry.
    Middle = 3,
    /// The record concludes a multi-record entry.
    Last = 4,
}

impl RecordType {
    /// Converts a byte to a record type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Full),
            2 => Some(Self::First),
            3 => Some(Self::Middle),
            4 => Some(Self::Last),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns true for types that start an entry (`Full`, `First`).
    #[must_use]
    pub const fn begins_entry(self) -> bool {
        matches!(self, Self::Full | Self::First)
    }

    /// Returns true for types that complete an entry (`Full`, `Last`).
    #[must_use]
    pub const fn ends_entry(self) -> bool {
        matches!(self, Self::Full | Self::Last)
    }
}

/// Record checksum: xxh64 of everything after the checksum field, folded to
/// 32 bits.
#[must_use]
pub fn checksum(data: &[u8]) -> u32 {
    let h = xxh64(data, 0);
    ((h << 32) ^ h) as u32
}

/// Appends an encoded record to `buf`.
///
/// `data` must not exceed [`MAX_RECORD_DATA`].
pub(crate) fn encode_record(buf: &mut Vec<u8>, typ: RecordType, offset: u64, data: &[u8]) {
    debug_assert!(data.len() <= MAX_RECORD_DATA);
    let start = buf.len();
    buf.extend_from_slice(&[0u8; 4]);
    buf.push(typ.as_byte());
    // Safe: MAX_RECORD_DATA < u16::MAX
    buf.extend_from_slice(&(data.len() as u16).to_le_bytes());
    buf.extend_from_slice(&offset.to_le_bytes());
    buf.extend_from_slice(data);
    let sum = checksum(&buf[start + 4..]);
    buf[start..start + 4].copy_from_slice(&sum.to_le_bytes());
}

/// A record located inside a block buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    /// Position of the record header within the block buffer.
    pub pos: usize,
    pub typ: RecordType,
    /// Physical distance from the entry's first record to this one.
    pub offset: u64,
    /// Range of the record data within the block buffer.
    pub data: Range<usize>,
}

impl Record {
    /// Parses the record starting at `pos` in `buf`.
    ///
    /// `buf` must end where the block (or the readable stream) ends. Returns
    /// `None` if the record is truncated, fails its checksum, has an unknown
    /// type, or violates the offset rule (`Full`/`First` carry offset 0,
    /// `Middle`/`Last` a non-zero offset).
    pub fn parse(buf: &[u8], pos: usize) -> Option<Self> {
        let header = buf.get(pos..pos.checked_add(HEADER_SIZE)?)?;
        let stored = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let type_byte = header[4];
        let length = usize::from(u16::from_le_bytes([header[5], header[6]]));
        let mut offset_bytes = [0u8; 8];
        offset_bytes.copy_from_slice(&header[7..15]);
        let offset = u64::from_le_bytes(offset_bytes);

        let data_start = pos + HEADER_SIZE;
        let data_end = data_start + length;
        if data_end > buf.len() || checksum(&buf[pos + 4..data_end]) != stored {
            return None;
        }

        let typ = RecordType::from_byte(type_byte)?;
        if typ.begins_entry() != (offset == 0) {
            return None;
        }

        Some(Self {
            pos,
            typ,
            offset,
            data: data_start..data_end,
        })
    }

    /// Encoded size of the record, header included.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.data.len()
    }
}
