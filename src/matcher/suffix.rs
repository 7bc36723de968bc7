// Suffix array over old data.
//
// Sorting is delegated to divsufsort (induced sorting, linear extra space).
// Lookups binary-search the sorted suffixes for the longest prefix shared
// with a needle.

use super::common_prefix;
use crate::error::{Error, Result};

/// Index type used by `divsufsort` (its `common::Idx`, which is not exported).
type Idx = i32;

/// Sorted suffix positions of one old buffer.
#[derive(Debug, Clone)]
pub struct SuffixArray {
    sa: Vec<Idx>,
}

impl SuffixArray {
    /// Sort all suffixes of `old`.
    pub fn build(old: &[u8]) -> Result<Self> {
        let n = old.len();
        if n >= Idx::MAX as usize {
            return Err(Error::Encoding(format!(
                "{n}-byte old data is too large for in-memory matching"
            )));
        }
        if n == 0 {
            return Ok(Self { sa: Vec::new() });
        }

        let mut sa = vec![0; n];
        divsufsort::sort_in_place(old, &mut sa);
        Ok(Self { sa })
    }

    pub fn len(&self) -> usize {
        self.sa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sa.is_empty()
    }

    /// Position in `old` sharing the longest prefix with `needle`, and that
    /// prefix's length. `old` must be the buffer the array was built from.
    pub fn longest_match(&self, old: &[u8], needle: &[u8]) -> (usize, usize) {
        if self.sa.is_empty() || needle.is_empty() {
            return (0, 0);
        }
        let suffix = |idx: usize| &old[self.sa[idx] as usize..];
        let (mut lo, mut hi) = (0, self.sa.len() - 1);
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            let s = suffix(mid);
            let n = s.len().min(needle.len());
            if s[..n] < needle[..n] {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let lo_len = common_prefix(suffix(lo), needle);
        let hi_len = common_prefix(suffix(hi), needle);
        if lo_len >= hi_len {
            (self.sa[lo] as usize, lo_len)
        } else {
            (self.sa[hi] as usize, hi_len)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(data: &[u8]) -> Vec<Idx> {
        let mut sa: Vec<Idx> = (0..data.len() as Idx).collect();
        sa.sort_by(|&a, &b| data[a as usize..].cmp(&data[b as usize..]));
        sa
    }

    #[test]
    fn matches_naive_sort() {
        let inputs: [&[u8]; 5] = [
            b"banana",
            b"mississippi",
            b"aaaaaaaaaaaaaaaa",
            b"abcabcabcabx",
            &[3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5, 8, 9, 7, 9, 3, 2, 3, 8, 4, 6],
        ];
        for data in inputs {
            assert_eq!(SuffixArray::build(data).unwrap().sa, naive(data), "{data:?}");
        }
    }

    #[test]
    fn larger_inputs_match_naive_sort() {
        let mut s = 7u64;
        let noisy: Vec<u8> = (0..3000)
            .map(|_| {
                s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (s >> 60) as u8
            })
            .collect();
        let periodic = b"abcab".repeat(400);
        for data in [noisy, periodic, vec![0u8; 2048]] {
            assert_eq!(SuffixArray::build(&data).unwrap().sa, naive(&data));
        }
    }

    #[test]
    fn single_byte_and_empty() {
        assert_eq!(SuffixArray::build(b"x").unwrap().sa, [0]);
        let empty = SuffixArray::build(b"").unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.longest_match(b"", b"abc"), (0, 0));
    }

    #[test]
    fn finds_longest_match() {
        let old = b"the quick brown fox jumps over the lazy dog";
        let sa = SuffixArray::build(old).unwrap();
        let (pos, len) = sa.longest_match(old, b"the lazy cat");
        assert_eq!(pos, 31);
        assert_eq!(len, 9);
        let (pos, len) = sa.longest_match(old, b"brown fox");
        assert_eq!((pos, len), (10, 9));
        let (_, len) = sa.longest_match(old, b"zzz");
        assert_eq!(len, 1);
        let (_, len) = sa.longest_match(old, b"#");
        assert_eq!(len, 0);
    }
}
