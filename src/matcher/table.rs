// Block index for the streaming engine.
//
// Open table of `2^bits` buckets, one entry per bucket, no chaining. Entries
// hold `block_index + 1` so that 0 means empty. The first block inserted for
// a bucket is kept: earlier old offsets make for cheaper copy records once a
// run of copies is established.

/// Entry offset so a stored 0 means "empty bucket".
const EMPTY_OFFSET: u32 = 1;

/// Bucket count cap (2^28 entries, 1 GiB of `u32`).
const MAX_BITS: u32 = 28;

pub struct BlockTable {
    buckets: Vec<u32>,
    bits: u32,
    block_size: u64,
}

impl BlockTable {
    /// Table sized for `blocks` entries of `block_size` bytes.
    pub fn new(blocks: u64, block_size: usize) -> Self {
        // Twice as many buckets as blocks keeps collisions rare.
        let wanted = blocks.saturating_mul(2).max(16);
        let bits = (64 - (wanted - 1).leading_zeros()).min(MAX_BITS);
        Self {
            buckets: vec![0; 1usize << bits],
            bits,
            block_size: block_size as u64,
        }
    }

    #[inline(always)]
    fn bucket(&self, hash: u64) -> usize {
        // Fold the hash's high bits into the bucket index.
        ((hash ^ (hash >> 29)).wrapping_mul(0xBF58_476D_1CE4_E5B9) >> (64 - self.bits)) as usize
    }

    /// Record the block starting at `old_offset` (a multiple of the block
    /// size) unless its bucket is taken. Blocks beyond `u32` indexing are
    /// skipped.
    #[inline]
    pub fn insert(&mut self, hash: u64, old_offset: u64) {
        let Ok(stored) = u32::try_from(old_offset / self.block_size + u64::from(EMPTY_OFFSET))
        else {
            return;
        };
        let bucket = self.bucket(hash);
        if self.buckets[bucket] == 0 {
            self.buckets[bucket] = stored;
        }
    }

    /// Old offset of the block recorded for `hash`, if any.
    #[inline]
    pub fn lookup(&self, hash: u64) -> Option<u64> {
        match self.buckets[self.bucket(hash)] {
            0 => None,
            stored => Some(u64::from(stored - EMPTY_OFFSET) * self.block_size),
        }
    }

    /// Bucket count.
    pub fn size(&self) -> usize {
        self.buckets.len()
    }
}
