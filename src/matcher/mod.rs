// Copy/insert discovery between old and new.
//
// Two engines share one contract: given old and new, return operations that
// cover new exactly, in order.
//
//   - `memory`: suffix array over old, longest-match binary search.
//   - `stream`: block-hash index over old, new scanned in bounded windows.
//
// Both are greedy. At each position of new they weigh the best indexed match
// against the continuation of the previous copy's diagonal, score each as
// `length - record_cost`, and take the better one when its score reaches
// `match_score`. The continuation wins ties.

pub mod config;
pub mod memory;
pub mod rolling;
pub mod stream;
pub mod suffix;
pub mod table;

pub use config::MatchConfig;

use crate::format::Operation;
use crate::format::varint::{sizeof_u64, zigzag};

/// A verified match of new at the current position against old.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub old_offset: u64,
    pub length: u64,
}

/// Length of the common prefix of `a` and `b`.
pub(crate) fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);
    let mut i = 0;
    for (ca, cb) in a.chunks_exact(8).zip(b.chunks_exact(8)) {
        if ca != cb {
            break;
        }
        i += 8;
    }
    i + a[i..]
        .iter()
        .zip(&b[i..])
        .take_while(|(x, y)| x == y)
        .count()
}

/// Length of the common suffix of `a` and `b`.
pub(crate) fn common_suffix(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

// ---------------------------------------------------------------------------
// Operation builder
// ---------------------------------------------------------------------------

/// Accumulates operations while tracking the pending insert and the end of
/// the previous copy.
#[derive(Debug, Default)]
pub(crate) struct OpBuilder {
    ops: Vec<Operation>,
    pending_start: u64,
    prev_end: u64,
}

impl OpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start of the not yet covered region of new.
    pub fn pending_start(&self) -> u64 {
        self.pending_start
    }

    /// Old offset on the previous copy's diagonal for new position `pos`.
    pub fn continuation(&self, pos: u64) -> u64 {
        self.prev_end + (pos - self.pending_start)
    }

    /// Record cost of a copy, counting the record that resumes inserting.
    fn score(&self, c: &Candidate) -> i64 {
        let delta = c.old_offset.wrapping_sub(self.prev_end) as i64;
        let cost = sizeof_u64((c.length << 1) | 1) + sizeof_u64(zigzag(delta)) + 1;
        c.length as i64 - cost as i64
    }

    /// Pick between the diagonal continuation and an indexed match.
    ///
    /// Returns the winner if its score reaches `min_score`.
    pub fn choose(
        &self,
        continuation: Option<Candidate>,
        indexed: Option<Candidate>,
        min_score: u32,
    ) -> Option<Candidate> {
        let best = match (continuation, indexed) {
            (Some(c), Some(i)) => {
                if self.score(&i) > self.score(&c) {
                    i
                } else {
                    c
                }
            }
            (Some(c), None) => c,
            (None, Some(i)) => i,
            (None, None) => return None,
        };
        (self.score(&best) >= i64::from(min_score)).then_some(best)
    }

    /// Emit a copy of `length` bytes of old at `old_offset` covering new from
    /// `new_pos`. Any gap since the pending start becomes an insert.
    pub fn copy(&mut self, new_pos: u64, old_offset: u64, length: u64) {
        debug_assert!(new_pos >= self.pending_start);
        if new_pos > self.pending_start {
            self.ops.push(Operation::Insert {
                length: new_pos - self.pending_start,
            });
        }
        self.ops.push(Operation::Copy { old_offset, length });
        self.pending_start = new_pos + length;
        self.prev_end = old_offset + length;
    }

    /// Close the tail insert and return the operations.
    pub fn finish(mut self, new_len: u64) -> Vec<Operation> {
        if new_len > self.pending_start {
            self.ops.push(Operation::Insert {
                length: new_len - self.pending_start,
            });
        }
        self.ops
    }
}
