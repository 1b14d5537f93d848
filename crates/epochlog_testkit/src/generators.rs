//! Property-based test generators using proptest.
//!
//! Entry sizes are biased toward the block geometry, where most of the
//! interesting framing cases live.

use crate::fixtures::payload;
use crate::integration::StateOp;
use epochlog_log::{BLOCK_SIZE, HEADER_SIZE, MAX_RECORD_DATA};
use proptest::prelude::*;
use std::ops::Range;

/// Strategy for entry sizes: mostly small, sometimes spanning blocks, and
/// sometimes exactly on a record boundary.
pub fn entry_size_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![
        4 => 0usize..256,
        2 => 256usize..3 * BLOCK_SIZE,
        1 => prop::sample::select(vec![
            MAX_RECORD_DATA - HEADER_SIZE,
            MAX_RECORD_DATA - 1,
            MAX_RECORD_DATA,
            MAX_RECORD_DATA + 1,
            2 * MAX_RECORD_DATA,
        ]),
    ]
}

/// Strategy for entry payloads sized by [`entry_size_strategy`].
pub fn entry_strategy() -> impl Strategy<Value = Vec<u8>> {
    (entry_size_strategy(), any::<u64>()).prop_map(|(len, seed)| payload(seed, len))
}

/// Strategy for a batch of entries.
pub fn entry_batch_strategy(len: Range<usize>) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(entry_strategy(), len)
}

/// Strategy for a single state operation. Updates are more common than
/// snapshots, and snapshots tend to be larger.
pub fn state_op_strategy() -> impl Strategy<Value = StateOp> {
    prop_oneof![
        1 => entry_strategy().prop_map(StateOp::Snapshot),
        3 => (0usize..512, any::<u64>())
            .prop_map(|(len, seed)| StateOp::Update(payload(seed, len))),
    ]
}

/// Strategy for a sequence of state operations.
pub fn state_ops_strategy(len: Range<usize>) -> impl Strategy<Value = Vec<StateOp>> {
    prop::collection::vec(state_op_strategy(), len)
}
