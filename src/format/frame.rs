// Frame layer for the control and literal streams.
//
//   [raw_len:varint][packed_len:varint][adler32(raw):u32 BE][packed bytes]
//
// `packed_len == raw_len` marks a stored frame. The writer only keeps codec
// output when it is strictly smaller than the raw bytes, so a compressed
// frame always has `packed_len < raw_len`.

use std::sync::Arc;

use log::trace;

use super::varint::{self, MAX_VARINT_LEN};
use crate::delta::codec::Codec;
use crate::error::{Error, Result};
use crate::stream::{OutputCursor, StreamInput, StreamOutput};

/// Hard upper bound on the raw size of one frame.
pub const MAX_FRAME_LEN: usize = 64 << 20;

/// Largest encoded frame header.
pub const MAX_FRAME_HEADER_LEN: usize = 2 * MAX_VARINT_LEN + 4;

fn adler32(data: &[u8]) -> u32 {
    let mut hasher = simd_adler32::Adler32::new();
    hasher.write(data);
    hasher.finish()
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination for encoded frames.
pub trait FrameSink {
    fn put(&mut self, bytes: &[u8]) -> Result<()>;
}

impl FrameSink for Vec<u8> {
    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl<W: StreamOutput + ?Sized> FrameSink for OutputCursor<'_, W> {
    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.append(bytes)
    }
}

/// Totals for one written stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub raw_bytes: u64,
    /// Encoded stream length, frame headers included.
    pub stream_bytes: u64,
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Accumulates raw bytes and emits a frame whenever `capacity` is reached.
pub struct FrameWriter<'c> {
    codec: &'c dyn Codec,
    capacity: usize,
    raw: Vec<u8>,
    stats: FrameStats,
}

impl<'c> FrameWriter<'c> {
    pub fn new(codec: &'c dyn Codec, capacity: usize) -> Self {
        let capacity = capacity.clamp(2 * MAX_VARINT_LEN, MAX_FRAME_LEN);
        Self {
            codec,
            capacity,
            raw: Vec::with_capacity(capacity),
            stats: FrameStats::default(),
        }
    }

    /// Append an indivisible record. It never straddles two frames.
    pub fn push_record<S: FrameSink + ?Sized>(&mut self, record: &[u8], sink: &mut S) -> Result<()> {
        debug_assert!(record.len() <= self.capacity);
        if self.raw.len() + record.len() > self.capacity {
            self.flush(sink)?;
        }
        self.raw.extend_from_slice(record);
        Ok(())
    }

    /// Append bytes that may be split across frames.
    pub fn push_bytes<S: FrameSink + ?Sized>(&mut self, mut data: &[u8], sink: &mut S) -> Result<()> {
        while !data.is_empty() {
            if self.raw.len() == self.capacity {
                self.flush(sink)?;
            }
            let take = (self.capacity - self.raw.len()).min(data.len());
            self.raw.extend_from_slice(&data[..take]);
            data = &data[take..];
        }
        Ok(())
    }

    /// Emit buffered bytes as a frame, if any.
    pub fn flush<S: FrameSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        if self.raw.is_empty() {
            return Ok(());
        }
        let packed = self.codec.compress(&self.raw)?;
        let body: &[u8] = if packed.len() < self.raw.len() {
            &packed
        } else {
            &self.raw
        };

        let mut head = Vec::with_capacity(MAX_FRAME_HEADER_LEN);
        varint::push_u64(&mut head, self.raw.len() as u64);
        varint::push_u64(&mut head, body.len() as u64);
        head.extend_from_slice(&adler32(&self.raw).to_be_bytes());
        sink.put(&head)?;
        sink.put(body)?;

        trace!(
            "frame {}: {} raw -> {} packed",
            self.stats.frames,
            self.raw.len(),
            body.len()
        );
        self.stats.frames += 1;
        self.stats.raw_bytes += self.raw.len() as u64;
        self.stats.stream_bytes += (head.len() + body.len()) as u64;
        self.raw.clear();
        Ok(())
    }

    /// Flush the tail frame and return stream totals.
    pub fn finish<S: FrameSink + ?Sized>(mut self, sink: &mut S) -> Result<FrameStats> {
        self.flush(sink)?;
        Ok(self.stats)
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Walks the frames of one stream inside a patch.
pub struct FrameReader {
    pos: u64,
    end: u64,
    codec: Arc<dyn Codec>,
    frames: u64,
}

impl FrameReader {
    /// Reader over `len` bytes of frames starting at `offset`.
    pub fn new(offset: u64, len: u64, codec: Arc<dyn Codec>) -> Self {
        Self {
            pos: offset,
            end: offset + len,
            codec,
            frames: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.end
    }

    pub fn frames_read(&self) -> u64 {
        self.frames
    }

    /// Decode the next frame into `out` (cleared first).
    ///
    /// `packed` is scratch for the compressed body. Returns `false` once the
    /// stream is exhausted.
    pub fn next_frame<I: StreamInput + ?Sized>(
        &mut self,
        input: &mut I,
        packed: &mut Vec<u8>,
        out: &mut Vec<u8>,
    ) -> Result<bool> {
        if self.is_exhausted() {
            return Ok(false);
        }
        let remaining = self.end - self.pos;
        let avail = remaining.min(MAX_FRAME_HEADER_LEN as u64) as usize;
        let mut head = [0u8; MAX_FRAME_HEADER_LEN];
        input.read_at(self.pos, &mut head[..avail])?;

        let (raw_len, a) = varint::read_u64(&head[..avail])?;
        let (packed_len, b) = varint::read_u64(&head[a..avail])?;
        let head_len = a + b + 4;
        if head_len > avail {
            return Err(Error::malformed("truncated frame header"));
        }
        let mut sum = [0u8; 4];
        sum.copy_from_slice(&head[a + b..head_len]);
        let checksum = u32::from_be_bytes(sum);

        if raw_len == 0 || raw_len > MAX_FRAME_LEN as u64 {
            return Err(Error::malformed(format!("frame raw length {raw_len} out of range")));
        }
        if packed_len > raw_len {
            return Err(Error::malformed("frame packed length exceeds raw length"));
        }
        if packed_len > remaining - head_len as u64 {
            return Err(Error::malformed("frame overruns its stream"));
        }
        let raw_len = raw_len as usize;
        let body_at = self.pos + head_len as u64;

        out.clear();
        if packed_len as usize == raw_len {
            out.resize(raw_len, 0);
            input.read_at(body_at, out)?;
        } else {
            packed.clear();
            packed.resize(packed_len as usize, 0);
            input.read_at(body_at, packed)?;
            self.codec.decompress(packed, raw_len, out)?;
            if out.len() != raw_len {
                return Err(Error::malformed(format!(
                    "frame decompressed to {} bytes, expected {raw_len}",
                    out.len()
                )));
            }
        }
        if adler32(out) != checksum {
            return Err(Error::malformed("frame checksum mismatch"));
        }

        self.pos = body_at + packed_len;
        self.frames += 1;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::codec::Stored;
    use crate::error::IoRole;
    use crate::stream::MemInput;

    fn read_all(stream: &[u8], codec: Arc<dyn Codec>) -> Result<Vec<Vec<u8>>> {
        let mut input = MemInput::new(stream, IoRole::Diff);
        let mut reader = FrameReader::new(0, stream.len() as u64, codec);
        let mut frames = Vec::new();
        let (mut packed, mut out) = (Vec::new(), Vec::new());
        while reader.next_frame(&mut input, &mut packed, &mut out)? {
            frames.push(out.clone());
        }
        Ok(frames)
    }

    #[test]
    fn bytes_split_at_capacity() {
        let codec = Stored;
        let mut sink = Vec::new();
        let mut w = FrameWriter::new(&codec, 64);
        w.push_bytes(&[7u8; 150], &mut sink).unwrap();
        let stats = w.finish(&mut sink).unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.raw_bytes, 150);
        assert_eq!(stats.stream_bytes, sink.len() as u64);

        let frames = read_all(&sink, Arc::new(Stored)).unwrap();
        let lens: Vec<_> = frames.iter().map(Vec::len).collect();
        assert_eq!(lens, [64, 64, 22]);
    }

    #[test]
    fn records_never_straddle() {
        let codec = Stored;
        let mut sink = Vec::new();
        let mut w = FrameWriter::new(&codec, 20);
        for _ in 0..3 {
            w.push_record(&[1u8; 8], &mut sink).unwrap();
        }
        w.finish(&mut sink).unwrap();
        let frames = read_all(&sink, Arc::new(Stored)).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 16);
        assert_eq!(frames[1].len(), 8);
    }

    #[test]
    fn empty_writer_emits_nothing() {
        let codec = Stored;
        let mut sink = Vec::new();
        let stats = FrameWriter::new(&codec, 64).finish(&mut sink).unwrap();
        assert_eq!(stats, FrameStats::default());
        assert!(sink.is_empty());
        assert!(read_all(&sink, Arc::new(Stored)).unwrap().is_empty());
    }

    #[cfg(feature = "zlib-codec")]
    #[test]
    fn compressible_frames_are_packed() {
        use crate::delta::codec::{CodecConfig, ZlibCodec};
        let codec = ZlibCodec::new(&CodecConfig::default());
        let mut sink = Vec::new();
        let mut w = FrameWriter::new(&codec, 4096);
        w.push_bytes(&[0u8; 4000], &mut sink).unwrap();
        w.finish(&mut sink).unwrap();
        assert!(sink.len() < 200);
        let frames = read_all(&sink, Arc::new(codec)).unwrap();
        assert_eq!(frames, vec![vec![0u8; 4000]]);
    }

    #[test]
    fn checksum_detects_flipped_byte() {
        let codec = Stored;
        let mut sink = Vec::new();
        let mut w = FrameWriter::new(&codec, 64);
        w.push_bytes(b"some literal bytes", &mut sink).unwrap();
        w.finish(&mut sink).unwrap();
        let last = sink.len() - 1;
        sink[last] ^= 0x01;
        assert!(matches!(
            read_all(&sink, Arc::new(Stored)),
            Err(Error::MalformedPatch(_))
        ));
    }

    #[test]
    fn overrunning_frame_rejected() {
        let mut stream = Vec::new();
        varint::push_u64(&mut stream, 10);
        varint::push_u64(&mut stream, 10);
        stream.extend_from_slice(&[0u8; 4]);
        stream.extend_from_slice(b"short");
        assert!(matches!(
            read_all(&stream, Arc::new(Stored)),
            Err(Error::MalformedPatch(_))
        ));
    }

    #[test]
    fn zero_length_frame_rejected() {
        let stream = [0u8, 0, 0, 0, 0, 1];
        assert!(matches!(
            read_all(&stream, Arc::new(Stored)),
            Err(Error::MalformedPatch(_))
        ));
    }
}
