// Post-encode verification.
//
// A fresh patch is decoded against the same old input into a
// `CompareOutput`, which checks every written chunk against new instead of
// storing it. Any mismatch or decode failure is reported as corruption; I/O
// failures on the inputs keep their own classification.

use std::sync::Arc;

use log::debug;

use super::codec::Codec;
use super::decoder::{self, PatchOptions, Scratch};
use crate::error::{Error, Result};
use crate::stream::{IO_CACHE_SIZE, StreamInput, StreamOutput};

/// Output that compares writes against an expected input.
pub struct CompareOutput<'a, N: StreamInput + ?Sized> {
    expected: &'a mut N,
    buf: Vec<u8>,
    checked: u64,
}

impl<'a, N: StreamInput + ?Sized> CompareOutput<'a, N> {
    pub fn new(expected: &'a mut N) -> Self {
        Self {
            expected,
            buf: Vec::new(),
            checked: 0,
        }
    }

    /// Bytes compared so far.
    pub fn checked(&self) -> u64 {
        self.checked
    }
}

fn mismatch(offset: u64) -> Error {
    Error::Corruption(format!("decoded output differs from new data near offset {offset}"))
}

impl<N: StreamInput + ?Sized> StreamOutput for CompareOutput<'_, N> {
    fn size(&self) -> u64 {
        self.expected.size()
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if let Some(want) = self.expected.slice_at(offset, data.len()) {
            if want != data {
                return Err(mismatch(offset));
            }
        } else {
            for (k, chunk) in data.chunks(IO_CACHE_SIZE).enumerate() {
                let at = offset + (k * IO_CACHE_SIZE) as u64;
                self.buf.resize(chunk.len(), 0);
                self.expected.read_at(at, &mut self.buf)?;
                if self.buf != chunk {
                    return Err(mismatch(at));
                }
            }
        }
        self.checked += data.len() as u64;
        Ok(())
    }
}

fn replay<O, N, P>(old: &mut O, new: &mut N, patch: &mut P, codec: Arc<dyn Codec>) -> Result<()>
where
    O: StreamInput + ?Sized,
    N: StreamInput + ?Sized,
    P: StreamInput + ?Sized,
{
    let header = decoder::read_header(patch)?;
    if header.new_size != new.size() {
        return Err(Error::Corruption(format!(
            "header records {} new bytes, new data has {}",
            header.new_size,
            new.size()
        )));
    }
    let options = PatchOptions {
        codecs: vec![codec],
        ..Default::default()
    };
    let codec = decoder::check_applicable(&header, old.size(), &options)?;
    let mut scratch = Scratch::for_header(&header);
    let mut compare = CompareOutput::new(new);
    decoder::decode(&header, codec, &mut scratch, old, patch, &mut compare)?;
    if compare.checked() != header.new_size {
        return Err(Error::Corruption(format!(
            "patch produced {} of {} bytes",
            compare.checked(),
            header.new_size
        )));
    }
    Ok(())
}

/// Decode `patch` against `old` and require the result to equal `new`.
///
/// `codec` is the codec the patch was written with; it is consulted first so
/// custom codecs verify too.
pub fn verify<O, N, P>(old: &mut O, new: &mut N, patch: &mut P, codec: Arc<dyn Codec>) -> Result<()>
where
    O: StreamInput + ?Sized,
    N: StreamInput + ?Sized,
    P: StreamInput + ?Sized,
{
    match replay(old, new, patch, codec) {
        Ok(()) => {
            debug!("patch verified against {} new bytes", new.size());
            Ok(())
        }
        Err(e @ (Error::Io { .. } | Error::Corruption(_))) => Err(e),
        Err(other) => Err(Error::Corruption(other.to_string())),
    }
}
