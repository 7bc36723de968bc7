// Streaming matching engine with bounded memory.
//
// Old is read once to build a block index: every aligned `match_block_size`
// block is hashed into a `BlockTable`. New is then read in windows of
// `step_mem_size` bytes and scanned with a rolling hash. A table hit or the
// previous copy's diagonal is verified and extended by reading old through
// an `OldCache`; copies never extend past the current window, the next
// window picks the diagonal back up.
//
// Peak memory: one window of new, one cache of old, the table, and the
// operation list.

use log::debug;

use super::rolling::BlockHash;
use super::table::BlockTable;
use super::{Candidate, MatchConfig, OpBuilder, common_prefix, common_suffix};
use crate::error::Result;
use crate::format::Operation;
use crate::stream::{IO_CACHE_SIZE, StreamInput};

// ---------------------------------------------------------------------------
// Old-side read cache
// ---------------------------------------------------------------------------

/// One cached chunk of old, refilled around whatever offset is requested.
struct OldCache {
    buf: Vec<u8>,
    start: u64,
    capacity: usize,
}

impl OldCache {
    fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            start: 0,
            capacity,
        }
    }

    fn end(&self) -> u64 {
        self.start + self.buf.len() as u64
    }

    fn fill<I: StreamInput + ?Sized>(&mut self, old: &mut I, start: u64, end: u64) -> Result<()> {
        self.buf.resize((end - start) as usize, 0);
        old.read_at(start, &mut self.buf)?;
        self.start = start;
        Ok(())
    }

    /// Cached bytes from `pos` onwards. `pos` must be inside old.
    fn starting_at<I: StreamInput + ?Sized>(&mut self, old: &mut I, pos: u64) -> Result<&[u8]> {
        if pos < self.start || pos >= self.end() {
            let end = old.size().min(pos + self.capacity as u64);
            self.fill(old, pos, end)?;
        }
        Ok(&self.buf[(pos - self.start) as usize..])
    }

    /// Cached bytes ending at `end`. `end` must be in `1..=old.size()`.
    fn ending_at<I: StreamInput + ?Sized>(&mut self, old: &mut I, end: u64) -> Result<&[u8]> {
        if end <= self.start || end > self.end() {
            let start = end.saturating_sub(self.capacity as u64);
            self.fill(old, start, end)?;
        }
        Ok(&self.buf[..(end - self.start) as usize])
    }

    /// Bytes of `against` matching old from `pos` forwards.
    fn forward_match<I: StreamInput + ?Sized>(
        &mut self,
        old: &mut I,
        pos: u64,
        against: &[u8],
    ) -> Result<u64> {
        let size = old.size();
        let mut matched = 0usize;
        while matched < against.len() && pos + (matched as u64) < size {
            let want = &against[matched..];
            let chunk = self.starting_at(old, pos + matched as u64)?;
            let n = common_prefix(chunk, want);
            matched += n;
            if n < chunk.len().min(want.len()) {
                break;
            }
        }
        Ok(matched as u64)
    }

    /// Bytes at the tail of `against` matching old backwards from `end`.
    fn backward_match<I: StreamInput + ?Sized>(
        &mut self,
        old: &mut I,
        end: u64,
        against: &[u8],
    ) -> Result<u64> {
        let mut matched = 0usize;
        while matched < against.len() && (matched as u64) < end {
            let want = &against[..against.len() - matched];
            let chunk = self.ending_at(old, end - matched as u64)?;
            let n = common_suffix(chunk, want);
            matched += n;
            if n < chunk.len().min(want.len()) {
                break;
            }
        }
        Ok(matched as u64)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Hash every aligned block of old.
fn index_old<I: StreamInput + ?Sized>(
    old: &mut I,
    hasher: &BlockHash,
    step: usize,
) -> Result<BlockTable> {
    let block = hasher.width();
    let size = old.size();
    let blocks = size / block as u64;
    let mut table = BlockTable::new(blocks, block);

    let chunk_len = (step / block).max(1) * block;
    let mut buf = vec![0u8; chunk_len];
    let mut pos = 0u64;
    while pos + block as u64 <= size {
        let len = (size - pos).min(chunk_len as u64) as usize / block * block;
        let chunk = &mut buf[..len];
        old.read_at(pos, chunk)?;
        for (k, blk) in chunk.chunks_exact(block).enumerate() {
            table.insert(hasher.checksum(blk), pos + (k * block) as u64);
        }
        pos += len as u64;
    }
    debug!("indexed {blocks} old blocks into {} buckets", table.size());
    Ok(table)
}

/// Find operations reconstructing `new` from `old`, reading both as streams.
pub fn find_operations<O, N>(old: &mut O, new: &mut N, config: &MatchConfig) -> Result<Vec<Operation>>
where
    O: StreamInput + ?Sized,
    N: StreamInput + ?Sized,
{
    config.validate()?;
    let new_size = new.size();
    let old_size = old.size();
    let mut ops = OpBuilder::new();
    if old_size == 0 || new_size == 0 {
        return Ok(ops.finish(new_size));
    }

    let block = config.match_block_size;
    let hasher = BlockHash::new(block);
    let table = index_old(old, &hasher, config.step_mem_size)?;
    let mut cache = OldCache::new(IO_CACHE_SIZE);

    let mut window: Vec<u8> = Vec::with_capacity(config.step_mem_size);
    let mut win_start = 0u64;
    let mut hash: Option<u64> = None;
    let mut i = 0u64;

    while i < new_size {
        let need = (block as u64).min(new_size - i);
        if i + need > win_start + window.len() as u64 {
            let len = (config.step_mem_size as u64).min(new_size - i) as usize;
            window.resize(len, 0);
            new.read_at(i, &mut window)?;
            win_start = i;
            hash = None;
        }
        let at = (i - win_start) as usize;
        let rest = &window[at..];

        // Only probe the previous diagonal shortly after a copy ends (or at
        // the very start, where it is the identity alignment).
        let diagonal = ops.continuation(i);
        let continuation = if i - ops.pending_start() <= block as u64 && diagonal < old_size {
            let length = cache.forward_match(old, diagonal, rest)?;
            (length > 0).then_some(Candidate {
                old_offset: diagonal,
                length,
            })
        } else {
            None
        };

        let mut indexed = None;
        if rest.len() >= block {
            let h = match hash {
                Some(h) => h,
                None => hasher.checksum(rest),
            };
            hash = Some(h);
            if let Some(pos) = table.lookup(h) {
                let length = cache.forward_match(old, pos, rest)?;
                if length > 0 {
                    indexed = Some(Candidate {
                        old_offset: pos,
                        length,
                    });
                }
            }
        }

        let Some(best) = ops.choose(continuation, indexed, config.match_score) else {
            hash = match hash {
                Some(h) if at + block < window.len() => Some(hasher.update(h, &window[at..])),
                _ => None,
            };
            i += 1;
            continue;
        };

        let floor = ops.pending_start().max(win_start);
        let pending = &window[(floor - win_start) as usize..at];
        let back = cache.backward_match(old, best.old_offset, pending)?;
        let start = i - back;
        let length = best.length + back;
        ops.copy(start, best.old_offset - back, length);
        i = start + length;
        hash = None;
    }

    let ops = ops.finish(new_size);
    debug!("matched {new_size} new bytes into {} operations", ops.len());
    Ok(ops)
}
