// Patch container header.
//
//   [old_size:u64 LE][new_size:u64 LE][compress_type_tag:u8]
//   [control_stream_len:varint][literal_stream_len:varint]
//
// The control stream starts right after the header and the literal stream
// right after the control stream; together they must account for every byte
// of the patch.

use super::varint::{self, MAX_VARINT_LEN};
use crate::error::{Error, Result};

/// Smallest prefix a caller must supply before header parsing is attempted.
pub const MIN_PROBE_SIZE: usize = 4;

/// Smallest possible header: two u64 sizes, the tag, two 1-byte varints.
pub const MIN_HEADER_SIZE: usize = 8 + 8 + 1 + 1 + 1;

/// Largest possible header (both lengths padded to full varint width).
pub const MAX_HEADER_SIZE: usize = 8 + 8 + 1 + 2 * MAX_VARINT_LEN;

/// Byte offset of the two stream-length varints.
const LENGTHS_OFFSET: usize = 17;

/// Parsed patch header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchHeader {
    /// Size of the old data the patch applies to.
    pub old_size: u64,
    /// Size of the reconstructed data.
    pub new_size: u64,
    /// Codec tag the streams were compressed with.
    pub compress_type_tag: u8,
    /// Byte length of the control stream.
    pub control_stream_size: u64,
    /// Byte length of the literal stream.
    pub literal_stream_size: u64,
    /// Encoded length of this header.
    pub header_size: u64,
}

impl PatchHeader {
    /// Serialize with canonical (shortest) varints.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAX_HEADER_SIZE);
        out.extend_from_slice(&self.old_size.to_le_bytes());
        out.extend_from_slice(&self.new_size.to_le_bytes());
        out.push(self.compress_type_tag);
        varint::push_u64(&mut out, self.control_stream_size);
        varint::push_u64(&mut out, self.literal_stream_size);
        out
    }

    /// Serialize with both lengths padded to `MAX_VARINT_LEN`, so the result
    /// is always `MAX_HEADER_SIZE` bytes long whatever the values.
    pub fn encode_fixed(&self) -> [u8; MAX_HEADER_SIZE] {
        let mut out = [0u8; MAX_HEADER_SIZE];
        out[..8].copy_from_slice(&self.old_size.to_le_bytes());
        out[8..16].copy_from_slice(&self.new_size.to_le_bytes());
        out[16] = self.compress_type_tag;
        out[LENGTHS_OFFSET..LENGTHS_OFFSET + MAX_VARINT_LEN]
            .copy_from_slice(&varint::encode_u64_padded(self.control_stream_size));
        out[LENGTHS_OFFSET + MAX_VARINT_LEN..]
            .copy_from_slice(&varint::encode_u64_padded(self.literal_stream_size));
        out
    }

    /// Parse the header from the leading bytes of a patch.
    ///
    /// `prefix` may be longer than the header; only the header is consumed.
    pub fn decode(prefix: &[u8]) -> Result<Self> {
        if prefix.len() < MIN_HEADER_SIZE {
            return Err(Error::malformed(format!(
                "patch is {} bytes, shorter than the {MIN_HEADER_SIZE}-byte header",
                prefix.len()
            )));
        }
        let old_size = read_u64_le(&prefix[..8]);
        let new_size = read_u64_le(&prefix[8..16]);
        let compress_type_tag = prefix[16];

        let mut pos = LENGTHS_OFFSET;
        let (control_stream_size, n) = varint::read_u64(&prefix[pos..])?;
        pos += n;
        let (literal_stream_size, n) = varint::read_u64(&prefix[pos..])?;
        pos += n;

        Ok(Self {
            old_size,
            new_size,
            compress_type_tag,
            control_stream_size,
            literal_stream_size,
            header_size: pos as u64,
        })
    }

    /// Total patch length this header describes.
    pub fn patch_size(&self) -> Option<u64> {
        self.header_size
            .checked_add(self.control_stream_size)?
            .checked_add(self.literal_stream_size)
    }

    /// Check the header against the actual patch length.
    pub fn validate(&self, actual_patch_size: u64) -> Result<()> {
        match self.patch_size() {
            Some(expected) if expected == actual_patch_size => {}
            Some(expected) => {
                return Err(Error::malformed(format!(
                    "header describes a {expected}-byte patch, got {actual_patch_size} bytes"
                )));
            }
            None => return Err(Error::malformed("stream sizes overflow")),
        }
        // An empty new payload carries no operations, and a non-empty one
        // always carries at least one control frame.
        if (self.new_size == 0) != (self.control_stream_size == 0) {
            return Err(Error::malformed(format!(
                "control stream of {} bytes for {} bytes of new data",
                self.control_stream_size, self.new_size
            )));
        }
        Ok(())
    }

    /// Offset of the first control stream byte.
    pub fn control_offset(&self) -> u64 {
        self.header_size
    }

    /// Offset of the first literal stream byte.
    pub fn literal_offset(&self) -> u64 {
        self.header_size + self.control_stream_size
    }
}

fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
