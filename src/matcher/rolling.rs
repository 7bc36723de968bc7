// Rolling block hash for the streaming engine.
//
// Polynomial hash over a fixed-width window, modulo 2^64:
//
//   h(b[0..w]) = b[0]·M^(w-1) + b[1]·M^(w-2) + ... + b[w-1]
//
// Sliding the window by one byte removes `b[0]·M^(w-1)`, multiplies by `M`
// and adds the incoming byte.

/// Odd 64-bit multiplier (golden-ratio constant).
const HASH_MULT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Hash state for one window width.
#[derive(Debug, Clone, Copy)]
pub struct BlockHash {
    width: usize,
    /// `HASH_MULT^(width-1)`: weight of the byte leaving the window.
    out_weight: u64,
}

impl BlockHash {
    pub fn new(width: usize) -> Self {
        debug_assert!(width > 0);
        let mut out_weight = 1u64;
        for _ in 1..width {
            out_weight = out_weight.wrapping_mul(HASH_MULT);
        }
        Self { width, out_weight }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Full hash of `base[..width]`.
    #[inline]
    pub fn checksum(&self, base: &[u8]) -> u64 {
        debug_assert!(base.len() >= self.width);
        base[..self.width].iter().fold(0u64, |h, &b| {
            h.wrapping_mul(HASH_MULT).wrapping_add(u64::from(b))
        })
    }

    /// Rolling update: drop `base[0]`, take in `base[width]`.
    #[inline(always)]
    pub fn update(&self, hash: u64, base: &[u8]) -> u64 {
        debug_assert!(base.len() > self.width);
        hash.wrapping_sub(u64::from(base[0]).wrapping_mul(self.out_weight))
            .wrapping_mul(HASH_MULT)
            .wrapping_add(u64::from(base[self.width]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_matches_full_checksum() {
        let data: Vec<u8> = (0..500u32).map(|i| (i * 37 % 256) as u8).collect();
        for width in [1usize, 8, 64] {
            let hasher = BlockHash::new(width);
            let mut h = hasher.checksum(&data);
            for start in 0..data.len() - width {
                h = hasher.update(h, &data[start..]);
                assert_eq!(h, hasher.checksum(&data[start + 1..]), "width {width} at {start}");
            }
        }
    }

    #[test]
    fn distinct_blocks_hash_differently() {
        let hasher = BlockHash::new(8);
        assert_ne!(hasher.checksum(b"abcdefgh"), hasher.checksum(b"abcdefgi"));
        assert_ne!(hasher.checksum(b"abcdefgh"), hasher.checksum(b"bacdefgh"));
    }
}
