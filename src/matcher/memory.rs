// In-memory matching engine.
//
// Indexes all of old with a suffix array, then walks new greedily. Accepted
// copies are first extended backwards into the pending insert, then the scan
// resumes after the copy.

use log::debug;

use super::suffix::SuffixArray;
use super::{Candidate, MatchConfig, OpBuilder, common_prefix, common_suffix};
use crate::error::Result;
use crate::format::Operation;
use crate::stream::ByteSpan;

/// Find operations reconstructing `new` from `old`.
pub fn find_operations(
    old: ByteSpan<'_>,
    new: ByteSpan<'_>,
    config: &MatchConfig,
) -> Result<Vec<Operation>> {
    let (old, new) = (old.as_bytes(), new.as_bytes());
    let mut ops = OpBuilder::new();
    if old.is_empty() || new.is_empty() {
        return Ok(ops.finish(new.len() as u64));
    }

    let index = SuffixArray::build(old)?;
    debug!("indexed {} old bytes", index.len());

    let mut i = 0usize;
    while i < new.len() {
        let rest = &new[i..];

        let diagonal = ops.continuation(i as u64);
        let continuation = (diagonal < old.len() as u64)
            .then(|| Candidate {
                old_offset: diagonal,
                length: common_prefix(&old[diagonal as usize..], rest) as u64,
            })
            .filter(|c| c.length > 0);

        let (pos, len) = index.longest_match(old, rest);
        let indexed = (len > 0).then_some(Candidate {
            old_offset: pos as u64,
            length: len as u64,
        });

        let Some(best) = ops.choose(continuation, indexed, config.match_score) else {
            i += 1;
            continue;
        };

        let floor = ops.pending_start() as usize;
        let at = best.old_offset as usize;
        let back = common_suffix(&old[..at], &new[floor..i]);
        let start = i - back;
        let length = best.length + back as u64;
        ops.copy(start as u64, (at - back) as u64, length);
        i = start + length as usize;
    }

    let ops = ops.finish(new.len() as u64);
    debug!("matched {} new bytes into {} operations", new.len(), ops.len());
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(old: &[u8], new: &[u8], ops: &[Operation]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut pos = 0usize;
        for op in ops {
            match *op {
                Operation::Copy { old_offset, length } => {
                    let at = old_offset as usize;
                    out.extend_from_slice(&old[at..at + length as usize]);
                }
                Operation::Insert { length } => {
                    out.extend_from_slice(&new[pos..pos + length as usize]);
                }
            }
            pos += op.len() as usize;
        }
        out
    }

    fn run(old: &[u8], new: &[u8]) -> Vec<Operation> {
        let ops = find_operations(
            ByteSpan::new(old),
            ByteSpan::new(new),
            &MatchConfig::default(),
        )
        .unwrap();
        assert_eq!(resolve(old, new, &ops), new);
        assert!(ops.iter().all(|op| !op.is_empty()));
        ops
    }

    #[test]
    fn identical_is_one_copy() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 251) as u8).collect();
        let ops = run(&data, &data);
        assert_eq!(
            ops,
            [Operation::Copy {
                old_offset: 0,
                length: 5000
            }]
        );
    }

    #[test]
    fn empty_inputs() {
        assert!(run(b"", b"").is_empty());
        assert_eq!(run(b"abc", b""), []);
        assert_eq!(run(b"", b"abc"), [Operation::Insert { length: 3 }]);
    }

    #[test]
    fn single_byte_edit_keeps_diagonal() {
        let old: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 253) as u8).collect();
        let mut new = old.clone();
        new[2000] ^= 0xFF;
        let ops = run(&old, &new);
        let copied: u64 = ops
            .iter()
            .filter(|op| matches!(op, Operation::Copy { .. }))
            .map(Operation::len)
            .sum();
        assert_eq!(copied, 4095);
    }

    #[test]
    fn moved_block_found() {
        let a: Vec<u8> = (0..1000u32).map(|i| (i % 200) as u8 ^ 0x5A).collect();
        let b: Vec<u8> = (0..1000u32).map(|i| (i * 13 % 241) as u8).collect();
        let old = [a.as_slice(), b.as_slice()].concat();
        let new = [b.as_slice(), b"inserted".as_slice(), a.as_slice()].concat();
        let ops = run(&old, &new);
        let inserted: u64 = ops
            .iter()
            .filter(|op| matches!(op, Operation::Insert { .. }))
            .map(Operation::len)
            .sum();
        assert!(inserted <= 8, "inserted {inserted}");
    }

    #[test]
    fn disjoint_data_is_literal() {
        let ops = run(&[0u8; 100], &[0xFFu8; 100]);
        assert_eq!(ops, [Operation::Insert { length: 100 }]);
    }
}
