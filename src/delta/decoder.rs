// Patch decoder.
//
// Three steps, each with its own failure class:
//
//   1. `read_header`: probe and parse the header, check it against the patch
//      length (`TooShort`, `MalformedPatch`).
//   2. `check_applicable`: old size and codec tag (`SizeMismatch`,
//      `UnsupportedCodec`). The caller then sizes its output to `new_size`
//      and builds a `Scratch` from the header.
//   3. `decode`: walk the control frames and replay each operation. Reads
//      outside old or writes outside the output are `Apply` errors; framing
//      damage is `MalformedPatch`.

use std::sync::Arc;

use log::debug;

use super::codec::{self, Codec, CodecConfig};
use crate::error::{Error, Result};
use crate::format::control::RecordCursor;
use crate::format::frame::FrameReader;
use crate::format::header::{MAX_HEADER_SIZE, MIN_PROBE_SIZE};
use crate::format::{Operation, PatchHeader};
use crate::matcher::config::DEFAULT_STEP_MEM_SIZE;
use crate::stream::{IO_CACHE_SIZE, StreamInput, StreamOutput};

/// Copy staging buffers held by a `Scratch`.
const COPY_CACHES: usize = 4;

/// Options for applying a patch.
#[derive(Clone, Default)]
pub struct PatchOptions {
    /// Extra codecs, consulted before the built-in ones.
    pub codecs: Vec<Arc<dyn Codec>>,
    pub codec_config: CodecConfig,
}

impl std::fmt::Debug for PatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tags: Vec<u8> = self.codecs.iter().map(|c| c.tag()).collect();
        f.debug_struct("PatchOptions")
            .field("codec_tags", &tags)
            .field("codec_config", &self.codec_config)
            .finish()
    }
}

/// Counts from one decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    pub operations: u64,
    pub copied: u64,
    pub inserted: u64,
    pub control_frames: u64,
    pub literal_frames: u64,
}

// ---------------------------------------------------------------------------
// Header phase
// ---------------------------------------------------------------------------

/// Read and validate the header of `patch`.
pub fn read_header<P: StreamInput + ?Sized>(patch: &mut P) -> Result<PatchHeader> {
    let size = patch.size();
    if size < MIN_PROBE_SIZE as u64 {
        return Err(Error::TooShort(size as usize));
    }
    let mut prefix = [0u8; MAX_HEADER_SIZE];
    let n = size.min(MAX_HEADER_SIZE as u64) as usize;
    patch.read_at(0, &mut prefix[..n])?;
    let header = PatchHeader::decode(&prefix[..n])?;
    header.validate(size)?;
    debug!(
        "patch header: old={} new={} tag={} control={} literal={}",
        header.old_size,
        header.new_size,
        header.compress_type_tag,
        header.control_stream_size,
        header.literal_stream_size
    );
    Ok(header)
}

/// Check that the patch applies to `old_size` bytes and that its codec is
/// available. Returns the codec.
pub fn check_applicable(
    header: &PatchHeader,
    old_size: u64,
    options: &PatchOptions,
) -> Result<Arc<dyn Codec>> {
    if header.old_size != old_size {
        return Err(Error::SizeMismatch {
            expected: header.old_size,
            actual: old_size,
        });
    }
    codec::resolve(header.compress_type_tag, &options.codecs, &options.codec_config)
}

// ---------------------------------------------------------------------------
// Scratch
// ---------------------------------------------------------------------------

/// Decoder working memory, sized from the header.
///
/// Frame buffers start at the header's step and grow per frame up to
/// `MAX_FRAME_LEN`. The copy stage holds `COPY_CACHES` I/O caches.
#[derive(Debug, Default)]
pub struct Scratch {
    control: Vec<u8>,
    literal: Vec<u8>,
    packed: Vec<u8>,
    copy: Vec<u8>,
}

impl Scratch {
    /// Reserve buffers for `header`. `step` is the largest frame the header
    /// can promise up front: no more than the output, no more than the
    /// larger stream, and never past one default step.
    pub fn for_header(header: &PatchHeader) -> Self {
        let step = Self::step_for(header);
        let reserve = |stream: u64| stream.min(step) as usize;
        let copy = header
            .old_size
            .min((COPY_CACHES * IO_CACHE_SIZE) as u64) as usize;
        Self {
            control: Vec::with_capacity(reserve(header.control_stream_size)),
            literal: Vec::with_capacity(reserve(header.literal_stream_size)),
            packed: Vec::with_capacity(step as usize),
            copy: Vec::with_capacity(copy),
        }
    }

    fn step_for(header: &PatchHeader) -> u64 {
        header
            .new_size
            .min(header.control_stream_size.max(header.literal_stream_size))
            .min(DEFAULT_STEP_MEM_SIZE as u64)
    }

    /// Bytes currently reserved.
    pub fn capacity(&self) -> usize {
        self.control.capacity()
            + self.literal.capacity()
            + self.packed.capacity()
            + self.copy.capacity()
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

fn copy_old<O, W>(
    old: &mut O,
    out: &mut W,
    from: u64,
    to: u64,
    length: u64,
    staging: &mut Vec<u8>,
) -> Result<()>
where
    O: StreamInput + ?Sized,
    W: StreamOutput + ?Sized,
{
    if let Some(src) = old.slice_at(from, length as usize) {
        return out.write_at(to, src);
    }
    let chunk = (length as usize).min(COPY_CACHES * IO_CACHE_SIZE);
    staging.resize(chunk, 0);
    let mut done = 0u64;
    while done < length {
        let n = (length - done).min(chunk as u64) as usize;
        old.read_at(from + done, &mut staging[..n])?;
        out.write_at(to + done, &staging[..n])?;
        done += n as u64;
    }
    Ok(())
}

/// Replay the patch into `out`, which must be exactly `new_size` bytes.
pub fn decode<O, P, W>(
    header: &PatchHeader,
    codec: Arc<dyn Codec>,
    scratch: &mut Scratch,
    old: &mut O,
    patch: &mut P,
    out: &mut W,
) -> Result<DecodeSummary>
where
    O: StreamInput + ?Sized,
    P: StreamInput + ?Sized,
    W: StreamOutput + ?Sized,
{
    if out.size() != header.new_size {
        return Err(Error::InvalidArgument(format!(
            "output holds {} bytes, patch produces {}",
            out.size(),
            header.new_size
        )));
    }
    let Scratch {
        control: records_buf,
        literal: literal_buf,
        packed,
        copy,
    } = scratch;
    records_buf.clear();
    literal_buf.clear();

    let mut control = FrameReader::new(
        header.control_offset(),
        header.control_stream_size,
        codec.clone(),
    );
    let mut literal = FrameReader::new(header.literal_offset(), header.literal_stream_size, codec);
    let mut records = RecordCursor::new();
    let (mut rpos, mut lpos) = (0usize, 0usize);
    let mut summary = DecodeSummary::default();
    let mut written = 0u64;

    while written < header.new_size {
        if rpos == records_buf.len() {
            if !control.next_frame(patch, packed, records_buf)? {
                return Err(Error::malformed(format!(
                    "control stream ended at {written} of {} output bytes",
                    header.new_size
                )));
            }
            rpos = 0;
        }
        let (op, used) = records.decode(&records_buf[rpos..])?;
        rpos += used;

        let length = op.len();
        if length > header.new_size - written {
            return Err(Error::apply(format!(
                "{length}-byte operation at {written} writes past the {}-byte output",
                header.new_size
            )));
        }
        match op {
            Operation::Copy { old_offset, length } => {
                if old_offset
                    .checked_add(length)
                    .is_none_or(|end| end > header.old_size)
                {
                    return Err(Error::apply(format!(
                        "copy {old_offset}+{length} reads past the {}-byte old data",
                        header.old_size
                    )));
                }
                copy_old(old, out, old_offset, written, length, copy)?;
                written += length;
                summary.copied += length;
            }
            Operation::Insert { length } => {
                let mut left = length;
                while left > 0 {
                    if lpos == literal_buf.len() {
                        if !literal.next_frame(patch, packed, literal_buf)? {
                            return Err(Error::apply(format!(
                                "insert at {written} runs past the literal stream"
                            )));
                        }
                        lpos = 0;
                    }
                    let n = left.min((literal_buf.len() - lpos) as u64) as usize;
                    out.write_at(written, &literal_buf[lpos..lpos + n])?;
                    lpos += n;
                    written += n as u64;
                    left -= n as u64;
                }
                summary.inserted += length;
            }
        }
        summary.operations += 1;
    }

    if rpos != records_buf.len() || !control.is_exhausted() {
        return Err(Error::malformed("control records left after the output was complete"));
    }
    if lpos != literal_buf.len() || !literal.is_exhausted() {
        return Err(Error::malformed("literal bytes left after the output was complete"));
    }
    summary.control_frames = control.frames_read();
    summary.literal_frames = literal.frames_read();
    debug!(
        "decoded {} ops ({} copied, {} inserted)",
        summary.operations, summary.copied, summary.inserted
    );
    Ok(summary)
}
