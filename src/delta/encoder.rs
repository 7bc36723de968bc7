// Patch encoder.
//
// Both modes run a matcher, normalize its operations, then write two framed
// streams: control records first, literal bytes second.
//
//   - `encode`: in-memory, suffix-array matcher, canonical header.
//   - `encode_stream`: any `StreamInput` pair, block-hash matcher. The output
//     starts with a reserved `MAX_HEADER_SIZE` slot that is filled with the
//     fixed-width header once both stream lengths are known.

use log::debug;

use super::codec::{Codec, CodecConfig, CodecKind};
use super::pipeline;
use crate::error::{IoRole, Result};
use crate::format::control::{MAX_RECORD_LEN, RecordCursor};
use crate::format::frame::{FrameSink, FrameStats, FrameWriter};
use crate::format::header::MAX_HEADER_SIZE;
use crate::format::{Operation, PatchHeader};
use crate::matcher::config::{
    DEFAULT_MATCH_BLOCK_SIZE, DEFAULT_MATCH_SCORE, DEFAULT_STEP_MEM_SIZE, MIN_STEP_MEM_SIZE,
};
use crate::matcher::{self, MatchConfig};
use crate::stream::{ByteSpan, IO_CACHE_SIZE, MemInput, OutputCursor, StreamInput, StreamOutput};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for producing a patch.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Minimum copy score; lower values accept shorter copies.
    pub match_score: u32,
    /// Streaming window size, also the raw size of one frame.
    pub step_mem_size: usize,
    /// Old-block width indexed by the streaming matcher.
    pub match_block_size: usize,
    /// Codec used for both streams.
    pub codec: CodecKind,
    /// Fixed codec parameters.
    pub codec_config: CodecConfig,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            match_score: DEFAULT_MATCH_SCORE,
            step_mem_size: DEFAULT_STEP_MEM_SIZE,
            match_block_size: DEFAULT_MATCH_BLOCK_SIZE,
            codec: CodecKind::default(),
            codec_config: CodecConfig::default(),
        }
    }
}

impl DiffOptions {
    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            match_score: self.match_score,
            step_mem_size: self.step_mem_size,
            match_block_size: self.match_block_size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.match_config().validate()
    }

    /// Raw frame size: one step, capped by the codec dictionary.
    pub fn frame_capacity(&self) -> usize {
        self.step_mem_size
            .min(self.codec_config.dictionary_size)
            .max(MIN_STEP_MEM_SIZE)
    }
}

/// What an encode produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSummary {
    pub header: PatchHeader,
    pub operations: usize,
    pub copied: u64,
    pub inserted: u64,
    pub control_frames: u64,
    pub literal_frames: u64,
}

impl EncodeSummary {
    fn new(header: PatchHeader, ops: &[Operation], control: FrameStats, literal: FrameStats) -> Self {
        let copied = ops
            .iter()
            .filter(|op| matches!(op, Operation::Copy { .. }))
            .map(Operation::len)
            .sum();
        Self {
            header,
            operations: ops.len(),
            copied,
            inserted: header.new_size - copied,
            control_frames: control.frames,
            literal_frames: literal.frames,
        }
    }

    /// Total patch length.
    pub fn patch_size(&self) -> u64 {
        self.header.header_size + self.header.control_stream_size + self.header.literal_stream_size
    }
}

// ---------------------------------------------------------------------------
// Stream writers
// ---------------------------------------------------------------------------

fn write_control<S: FrameSink + ?Sized>(
    ops: &[Operation],
    codec: &dyn Codec,
    capacity: usize,
    sink: &mut S,
) -> Result<FrameStats> {
    let mut frames = FrameWriter::new(codec, capacity);
    let mut cursor = RecordCursor::new();
    let mut record = Vec::with_capacity(MAX_RECORD_LEN);
    for op in ops {
        record.clear();
        cursor.encode(op, &mut record)?;
        frames.push_record(&record, sink)?;
    }
    frames.finish(sink)
}

fn write_literals<N: StreamInput + ?Sized, S: FrameSink + ?Sized>(
    ops: &[Operation],
    new: &mut N,
    codec: &dyn Codec,
    capacity: usize,
    sink: &mut S,
) -> Result<FrameStats> {
    let mut frames = FrameWriter::new(codec, capacity);
    let mut buf = Vec::new();
    let mut pos = 0u64;
    for op in ops {
        if let Operation::Insert { length } = *op {
            if let Some(bytes) = new.slice_at(pos, length as usize) {
                frames.push_bytes(bytes, sink)?;
            } else {
                let mut done = 0u64;
                while done < length {
                    let n = (length - done).min(IO_CACHE_SIZE as u64) as usize;
                    buf.resize(n, 0);
                    new.read_at(pos + done, &mut buf)?;
                    frames.push_bytes(&buf, sink)?;
                    done += n as u64;
                }
            }
        }
        pos += op.len();
    }
    frames.finish(sink)
}

fn prepare_ops(ops: Vec<Operation>, old_size: u64, new_size: u64) -> Result<Vec<Operation>> {
    let ops = pipeline::coalesce(&ops);
    pipeline::check(&ops, old_size, new_size)?;
    Ok(ops)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Encode a patch turning `old` into `new`, entirely in memory.
pub fn encode(
    old: ByteSpan<'_>,
    new: ByteSpan<'_>,
    options: &DiffOptions,
) -> Result<(Vec<u8>, EncodeSummary)> {
    options.validate()?;
    let (old_size, new_size) = (old.len() as u64, new.len() as u64);
    let ops = matcher::memory::find_operations(old, new, &options.match_config())?;
    let ops = prepare_ops(ops, old_size, new_size)?;

    let codec = options.codec.build(&options.codec_config);
    let capacity = options.frame_capacity();

    let mut control = Vec::new();
    let control_stats = write_control(&ops, codec.as_ref(), capacity, &mut control)?;
    let mut literal = Vec::new();
    let mut new_input = MemInput::from_span(new, IoRole::New);
    let literal_stats = write_literals(&ops, &mut new_input, codec.as_ref(), capacity, &mut literal)?;

    let mut header = PatchHeader {
        old_size,
        new_size,
        compress_type_tag: codec.tag(),
        control_stream_size: control.len() as u64,
        literal_stream_size: literal.len() as u64,
        header_size: 0,
    };
    let mut patch = header.encode();
    header.header_size = patch.len() as u64;
    patch.reserve(control.len() + literal.len());
    patch.extend_from_slice(&control);
    patch.extend_from_slice(&literal);

    let summary = EncodeSummary::new(header, &ops, control_stats, literal_stats);
    debug!(
        "encoded {} ops ({} copied, {} inserted) into {} bytes",
        summary.operations,
        summary.copied,
        summary.inserted,
        patch.len()
    );
    Ok((patch, summary))
}

/// Encode a patch from streams, writing it to `out` from offset 0.
///
/// New data is read one `step_mem_size` window at a time and frames are
/// flushed as they fill, but the whole operation list is collected before
/// the control stream is written: the literal stream starts right after the
/// control stream, so its offset is only known once every operation is.
/// Peak memory is therefore one window, the old-block index (one slot per
/// `match_block_size` bytes of old) and one `Operation` per copy or insert,
/// which grows with the number of edits rather than with `step_mem_size`.
pub fn encode_stream<O, N, W>(
    old: &mut O,
    new: &mut N,
    out: &mut W,
    options: &DiffOptions,
) -> Result<EncodeSummary>
where
    O: StreamInput + ?Sized,
    N: StreamInput + ?Sized,
    W: StreamOutput + ?Sized,
{
    options.validate()?;
    let (old_size, new_size) = (old.size(), new.size());
    let ops = matcher::stream::find_operations(old, new, &options.match_config())?;
    let ops = prepare_ops(ops, old_size, new_size)?;

    let codec = options.codec.build(&options.codec_config);
    let capacity = options.frame_capacity();

    let mut cursor = OutputCursor::new(&mut *out, MAX_HEADER_SIZE as u64);
    let control_stats = write_control(&ops, codec.as_ref(), capacity, &mut cursor)?;
    let literal_stats = write_literals(&ops, new, codec.as_ref(), capacity, &mut cursor)?;

    let header = PatchHeader {
        old_size,
        new_size,
        compress_type_tag: codec.tag(),
        control_stream_size: control_stats.stream_bytes,
        literal_stream_size: literal_stats.stream_bytes,
        header_size: MAX_HEADER_SIZE as u64,
    };
    out.write_at(0, &header.encode_fixed())?;

    let summary = EncodeSummary::new(header, &ops, control_stats, literal_stats);
    debug!(
        "stream-encoded {} ops ({} copied, {} inserted) into {} bytes",
        summary.operations,
        summary.copied,
        summary.inserted,
        summary.patch_size()
    );
    Ok(summary)
}
