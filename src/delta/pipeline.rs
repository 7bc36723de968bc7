// Operation clean-up between matching and encoding.
//
//   - Drop zero-length operations
//   - Merge adjacent inserts
//   - Merge adjacent copies whose old ranges are contiguous
//
// Then check the stream against the invariants the decoder relies on.

use crate::error::{Error, Result};
use crate::format::Operation;

/// Normalize an operation list. Coverage of new is unchanged.
pub fn coalesce(ops: &[Operation]) -> Vec<Operation> {
    let mut out: Vec<Operation> = Vec::with_capacity(ops.len());
    for op in ops.iter().filter(|op| !op.is_empty()) {
        let merged = match (out.last_mut(), *op) {
            (Some(Operation::Insert { length }), Operation::Insert { length: more }) => {
                *length += more;
                true
            }
            (
                Some(Operation::Copy { old_offset, length }),
                Operation::Copy {
                    old_offset: next,
                    length: more,
                },
            ) if *old_offset + *length == next => {
                *length += more;
                true
            }
            _ => false,
        };
        if !merged {
            out.push(*op);
        }
    }
    debug_assert_eq!(coverage(&out), coverage(ops), "coalescing changed coverage");
    out
}

/// Total bytes of new the operations produce.
pub fn coverage(ops: &[Operation]) -> u64 {
    ops.iter().map(Operation::len).sum()
}

/// Fail with an encoding error unless `ops` cover exactly `new_size` bytes
/// and every copy stays inside old.
pub fn check(ops: &[Operation], old_size: u64, new_size: u64) -> Result<()> {
    let mut covered = 0u64;
    for op in ops {
        if op.is_empty() {
            return Err(Error::Encoding("zero-length operation".into()));
        }
        if let Operation::Copy { old_offset, length } = *op
            && old_offset.checked_add(length).is_none_or(|end| end > old_size)
        {
            return Err(Error::Encoding(format!(
                "copy {old_offset}+{length} leaves {old_size}-byte old data"
            )));
        }
        covered += op.len();
    }
    if covered != new_size {
        return Err(Error::Encoding(format!(
            "operations cover {covered} bytes of {new_size}"
        )));
    }
    Ok(())
}
