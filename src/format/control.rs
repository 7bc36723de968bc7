// Delta operations and their control-record encoding.
//
// Record layout:
//   varint(length << 1 | kind)             kind 0 = Insert, 1 = Copy
//   zigzag-varint(old_offset - prev_end)   Copy only
//
// `prev_end` is the old offset just past the previous copy (0 initially), so
// copies that continue where the last one stopped cost a single byte.

use super::varint::{self, MAX_VARINT_LEN};
use crate::error::{Error, Result};

/// Largest encoded record: two full-width varints.
pub const MAX_RECORD_LEN: usize = 2 * MAX_VARINT_LEN;

/// Largest operation length representable in a record.
pub const MAX_OP_LEN: u64 = u64::MAX >> 1;

const KIND_INSERT: u64 = 0;
const KIND_COPY: u64 = 1;

/// One step of reconstructing new data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Copy `length` bytes of old starting at `old_offset`.
    Copy { old_offset: u64, length: u64 },
    /// Take the next `length` bytes of the literal stream.
    Insert { length: u64 },
}

impl Operation {
    pub fn len(&self) -> u64 {
        match *self {
            Self::Copy { length, .. } | Self::Insert { length } => length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tracks the previous copy end while writing or reading records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCursor {
    prev_end: u64,
}

impl RecordCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the record for `op` to `out`.
    pub fn encode(&mut self, op: &Operation, out: &mut Vec<u8>) -> Result<()> {
        let length = op.len();
        if length == 0 || length > MAX_OP_LEN {
            return Err(Error::Encoding(format!("unencodable operation length {length}")));
        }
        match *op {
            Operation::Insert { .. } => {
                varint::push_u64(out, (length << 1) | KIND_INSERT);
            }
            Operation::Copy { old_offset, .. } => {
                varint::push_u64(out, (length << 1) | KIND_COPY);
                let delta = old_offset.wrapping_sub(self.prev_end) as i64;
                varint::push_i64(out, delta);
                self.prev_end = old_offset.wrapping_add(length);
            }
        }
        Ok(())
    }

    /// Decode one record from the front of `data`.
    ///
    /// Returns the operation and the number of bytes consumed. Offsets are
    /// not range-checked here; the decoder checks them against old.
    pub fn decode(&mut self, data: &[u8]) -> Result<(Operation, usize)> {
        let (head, mut used) = varint::read_u64(data)?;
        let length = head >> 1;
        if length == 0 {
            return Err(Error::malformed("zero-length operation"));
        }
        if head & 1 == KIND_INSERT {
            return Ok((Operation::Insert { length }, used));
        }
        let (delta, n) = varint::read_i64(&data[used..])?;
        used += n;
        let old_offset = self
            .prev_end
            .checked_add_signed(delta)
            .ok_or_else(|| Error::apply(format!("copy offset delta {delta} leaves old data")))?;
        self.prev_end = old_offset
            .checked_add(length)
            .ok_or_else(|| Error::apply("copy end overflows"))?;
        Ok((Operation::Copy { old_offset, length }, used))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
