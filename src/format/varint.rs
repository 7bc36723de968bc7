// Variable-length integers used by the patch container.
//
// Base-128, big-endian: most-significant group first. Every byte has bit 7
// set except the final byte. Leading zero groups (0x80) decode as zero, which
// lets writers reserve a fixed-width slot and fill it in afterwards.
//
// Signed values (copy offset deltas) are zig-zag mapped first.

/// Maximum encoded length for a 64-bit value (ceil(64/7) = 10).
pub const MAX_VARINT_LEN: usize = 10;

/// Overflow guard: if these bits are set before a shift, the next `<< 7`
/// would drop significant bits.
const U64_OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `num` into the tail of `buf`. Returns the number of bytes used;
/// the encoding is `buf[MAX_VARINT_LEN - len..]`.
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F;
    MAX_VARINT_LEN - i
}

/// Append the canonical encoding of `num` to `out`.
pub fn push_u64(out: &mut Vec<u8>, num: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    out.extend_from_slice(&buf[MAX_VARINT_LEN - len..]);
}

/// Append a zig-zag encoded signed value to `out`.
pub fn push_i64(out: &mut Vec<u8>, num: i64) {
    push_u64(out, zigzag(num));
}

/// Encode `num` using exactly `MAX_VARINT_LEN` bytes (zero-group padded).
pub fn encode_u64_padded(num: u64) -> [u8; MAX_VARINT_LEN] {
    let mut buf = [0u8; MAX_VARINT_LEN];
    encode_u64(num, &mut buf);
    let len = sizeof_u64(num);
    for b in &mut buf[..MAX_VARINT_LEN - len] {
        *b = 0x80;
    }
    buf
}

// ---------------------------------------------------------------------------
// Decoding from byte slices
// ---------------------------------------------------------------------------

/// Decode a `u64` from the front of `data`.
/// Returns `(value, bytes_consumed)`.
pub fn read_u64(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_VARINT_LEN || val & U64_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Underflow)
}

/// Decode a zig-zag encoded `i64` from the front of `data`.
pub fn read_i64(data: &[u8]) -> Result<(i64, usize), VarIntError> {
    let (raw, len) = read_u64(data)?;
    Ok((unzigzag(raw), len))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Canonical encoded byte-length of `num`.
#[inline]
pub fn sizeof_u64(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    (bits.max(1).div_ceil(7) as usize).min(MAX_VARINT_LEN)
}

#[inline]
pub fn zigzag(num: i64) -> u64 {
    ((num << 1) ^ (num >> 63)) as u64
}

#[inline]
pub fn unzigzag(num: u64) -> i64 {
    ((num >> 1) as i64) ^ -((num & 1) as i64)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    /// Not enough input bytes to complete the integer.
    Underflow,
    /// Value would overflow 64 bits.
    Overflow,
}

impl std::fmt::Display for VarIntError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarIntError::Underflow => write!(f, "varint underflow (truncated input)"),
            VarIntError::Overflow => write!(f, "varint overflow"),
        }
    }
}

impl std::error::Error for VarIntError {}

impl From<VarIntError> for crate::error::Error {
    fn from(e: VarIntError) -> Self {
        crate::error::Error::malformed(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_boundaries() {
        let cases: &[u64] = &[0, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX];
        for &val in cases {
            let mut out = Vec::new();
            push_u64(&mut out, val);
            let (decoded, consumed) = read_u64(&out).unwrap();
            assert_eq!(decoded, val);
            assert_eq!(consumed, out.len());
            assert_eq!(sizeof_u64(val), out.len());
        }
    }

    #[test]
    fn encoding_is_big_endian() {
        // 300 = (10) (0101100) = 0x82 0x2C
        let mut out = Vec::new();
        push_u64(&mut out, 300);
        assert_eq!(out, [0x82, 0x2C]);
    }

    #[test]
    fn padded_encoding_decodes_to_same_value() {
        for val in [0u64, 5, 300, 1 << 40, u64::MAX] {
            let buf = encode_u64_padded(val);
            let (decoded, consumed) = read_u64(&buf).unwrap();
            assert_eq!(decoded, val);
            assert_eq!(consumed, MAX_VARINT_LEN);
        }
    }

    #[test]
    fn zigzag_maps_small_magnitudes_to_small_codes() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
        for v in [i64::MIN, -12345, 0, 12345, i64::MAX] {
            assert_eq!(unzigzag(zigzag(v)), v);
        }
    }

    #[test]
    fn underflow_detection() {
        assert_eq!(read_u64(&[0x80, 0x80, 0x80]), Err(VarIntError::Underflow));
        assert_eq!(read_u64(&[]), Err(VarIntError::Underflow));
    }

    #[test]
    fn overlong_input_rejected() {
        let data = [0xFFu8; 12];
        assert_eq!(read_u64(&data), Err(VarIntError::Overflow));
    }
}
