// In-memory diff and patch.
//
//   diff:  match -> encode -> verify -> patch bytes
//   patch: header -> size/codec checks -> allocate new_size -> replay
//
// Every produced patch is decoded once against the inputs before it is
// returned; a patch that does not reproduce `new` is never handed out.

use crate::delta::decoder::{self, PatchOptions, Scratch};
use crate::delta::encoder::{self, DiffOptions};
use crate::delta::verify;
use crate::error::{IoRole, Result};
use crate::format::PatchHeader;
use crate::stream::{ByteSpan, MemInput, MemOutput};

/// Produce a verified patch turning `old` into `new`, with default options.
pub fn diff(old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
    diff_with_options(old, new, &DiffOptions::default())
}

/// Produce a verified patch with custom options.
pub fn diff_with_options(old: &[u8], new: &[u8], options: &DiffOptions) -> Result<Vec<u8>> {
    diff_spans(ByteSpan::new(old), ByteSpan::new(new), options)
}

/// Produce a verified patch between two spans.
pub fn diff_spans(old: ByteSpan<'_>, new: ByteSpan<'_>, options: &DiffOptions) -> Result<Vec<u8>> {
    let (patch, _) = encoder::encode(old, new, options)?;
    verify::verify(
        &mut MemInput::from_span(old, IoRole::Old),
        &mut MemInput::from_span(new, IoRole::New),
        &mut MemInput::new(&patch, IoRole::Diff),
        options.codec.build(&options.codec_config),
    )?;
    Ok(patch)
}

/// Apply `diff` to `old`, returning the reconstructed new data.
pub fn patch(old: &[u8], diff: &[u8]) -> Result<Vec<u8>> {
    patch_with_options(old, diff, &PatchOptions::default())
}

/// Apply a patch, with extra codecs available for decoding.
pub fn patch_with_options(old: &[u8], diff: &[u8], options: &PatchOptions) -> Result<Vec<u8>> {
    let mut patch_in = MemInput::new(diff, IoRole::Diff);
    let header = decoder::read_header(&mut patch_in)?;
    let codec = decoder::check_applicable(&header, old.len() as u64, options)?;
    let mut out = MemOutput::with_size(header.new_size, IoRole::New)?;
    let mut scratch = Scratch::for_header(&header);
    decoder::decode(
        &header,
        codec,
        &mut scratch,
        &mut MemInput::new(old, IoRole::Old),
        &mut patch_in,
        &mut out,
    )?;
    Ok(out.into_inner())
}

/// Parse and validate the header of an in-memory patch.
pub fn inspect(diff: &[u8]) -> Result<PatchHeader> {
    decoder::read_header(&mut MemInput::new(diff, IoRole::Diff))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
