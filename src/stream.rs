// Stream abstraction over memory regions and files.
//
// Inputs are random-access readers with a known size; outputs are
// random-access writers. The encoder, decoder, matcher and verifier are all
// written against `StreamInput`/`StreamOutput`, so the in-memory and
// file-backed paths share one implementation.
//
// Lifecycle: file handles are released when the value is dropped. Outputs
// that buffer writes expose `close(self)`, which consumes the handle and
// reports flush/sync failures with the file's role.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, IoRole, IoStage, Result};

/// Buffer size for file-backed streams and copy staging.
pub const IO_CACHE_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// ByteSpan
// ---------------------------------------------------------------------------

/// Borrowed view over `data[start..end]`.
#[derive(Debug, Clone, Copy)]
pub struct ByteSpan<'a> {
    data: &'a [u8],
    start: usize,
    end: usize,
}

impl<'a> ByteSpan<'a> {
    /// Span covering all of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            start: 0,
            end: data.len(),
        }
    }

    /// Span covering `data[start..end]`.
    pub fn range(data: &'a [u8], start: usize, end: usize) -> Result<Self> {
        if start > end || end > data.len() {
            return Err(Error::InvalidArgument(format!(
                "span {start}..{end} outside {} bytes",
                data.len()
            )));
        }
        Ok(Self { data, start, end })
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        &self.data[self.start..self.end]
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl<'a> From<&'a [u8]> for ByteSpan<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::new(data)
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Random-access reader with a known size.
pub trait StreamInput {
    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Fill `buf` from `offset`. Reading past `size()` is an error.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Direct slice access for memory-backed inputs.
    ///
    /// Returns `None` when the range is out of bounds or the input is not
    /// contiguous in memory; callers then fall back to `read_at`.
    fn slice_at(&self, _offset: u64, _len: usize) -> Option<&[u8]> {
        None
    }
}

/// Random-access writer.
pub trait StreamOutput {
    /// Declared size, or the high-water mark of writes when undeclared.
    fn size(&self) -> u64;

    /// Write `data` at `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;
}

impl<T: StreamInput + ?Sized> StreamInput for &mut T {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, buf)
    }

    fn slice_at(&self, offset: u64, len: usize) -> Option<&[u8]> {
        (**self).slice_at(offset, len)
    }
}

impl<T: StreamOutput + ?Sized> StreamOutput for &mut T {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        (**self).write_at(offset, data)
    }
}

fn past_end(role: IoRole, stage: IoStage, offset: u64, len: usize, size: u64) -> Error {
    Error::io(
        role,
        stage,
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{len} bytes at offset {offset} exceed {size}-byte stream"),
        ),
    )
}

fn in_bounds(offset: u64, len: usize, size: u64) -> bool {
    offset
        .checked_add(len as u64)
        .is_some_and(|end| end <= size)
}

// ---------------------------------------------------------------------------
// Sequential output cursor
// ---------------------------------------------------------------------------

/// Appends to a `StreamOutput` starting at a fixed offset.
pub struct OutputCursor<'a, W: StreamOutput + ?Sized> {
    out: &'a mut W,
    pos: u64,
}

impl<'a, W: StreamOutput + ?Sized> OutputCursor<'a, W> {
    pub fn new(out: &'a mut W, pos: u64) -> Self {
        Self { out, pos }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.out.write_at(self.pos, data)?;
        self.pos += data.len() as u64;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Memory streams
// ---------------------------------------------------------------------------

/// Read-only stream over a byte slice.
#[derive(Debug, Clone, Copy)]
pub struct MemInput<'a> {
    data: &'a [u8],
    role: IoRole,
}

impl<'a> MemInput<'a> {
    pub fn new(data: &'a [u8], role: IoRole) -> Self {
        Self { data, role }
    }

    pub fn from_span(span: ByteSpan<'a>, role: IoRole) -> Self {
        Self::new(span.as_bytes(), role)
    }
}

impl StreamInput for MemInput<'_> {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        match self.slice_at(offset, buf.len()) {
            Some(src) => {
                buf.copy_from_slice(src);
                Ok(())
            }
            None => Err(past_end(
                self.role,
                IoStage::Read,
                offset,
                buf.len(),
                self.size(),
            )),
        }
    }

    fn slice_at(&self, offset: u64, len: usize) -> Option<&[u8]> {
        if !in_bounds(offset, len, self.size()) {
            return None;
        }
        let start = offset as usize;
        Some(&self.data[start..start + len])
    }
}

/// Owned in-memory output buffer.
#[derive(Debug)]
pub struct MemOutput {
    buf: Vec<u8>,
    fixed: bool,
    role: IoRole,
}

impl MemOutput {
    /// Output that grows to fit whatever is written.
    pub fn growable(role: IoRole) -> Self {
        Self {
            buf: Vec::new(),
            fixed: false,
            role,
        }
    }

    /// Zero-filled output of exactly `size` bytes. Writes past it fail.
    pub fn with_size(size: u64, role: IoRole) -> Result<Self> {
        let len = usize::try_from(size)
            .map_err(|_| Error::apply(format!("{size}-byte output does not fit in memory")))?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| Error::apply(format!("cannot allocate {size}-byte output")))?;
        buf.resize(len, 0);
        Ok(Self {
            buf,
            fixed: true,
            role,
        })
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl StreamOutput for MemOutput {
    fn size(&self) -> u64 {
        self.buf.len() as u64
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if !in_bounds(offset, data.len(), self.size()) {
            if self.fixed {
                return Err(past_end(
                    self.role,
                    IoStage::Write,
                    offset,
                    data.len(),
                    self.size(),
                ));
            }
            let end = offset
                .checked_add(data.len() as u64)
                .and_then(|end| usize::try_from(end).ok())
                .ok_or_else(|| {
                    Error::io(
                        self.role,
                        IoStage::Write,
                        io::Error::new(io::ErrorKind::OutOfMemory, "output too large"),
                    )
                })?;
            self.buf.resize(end, 0);
        }
        let start = offset as usize;
        self.buf[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File streams
// ---------------------------------------------------------------------------

/// Buffered random-access file reader.
///
/// Sequential reads are served from the `BufReader`; short backward or
/// forward jumps reuse its buffer via `seek_relative`.
#[derive(Debug)]
pub struct FileInput {
    reader: BufReader<File>,
    pos: u64,
    size: u64,
    role: IoRole,
}

impl FileInput {
    pub fn open(path: &Path, role: IoRole) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(role, IoStage::Open, e))?;
        let size = file
            .metadata()
            .map_err(|e| Error::io(role, IoStage::Open, e))?
            .len();
        Ok(Self {
            reader: BufReader::with_capacity(IO_CACHE_SIZE, file),
            pos: 0,
            size,
            role,
        })
    }
}

impl StreamInput for FileInput {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if !in_bounds(offset, buf.len(), self.size) {
            return Err(past_end(
                self.role,
                IoStage::Read,
                offset,
                buf.len(),
                self.size,
            ));
        }
        let read = |e| Error::io(self.role, IoStage::Read, e);
        if offset != self.pos {
            self.reader
                .seek_relative(offset as i64 - self.pos as i64)
                .map_err(read)?;
            self.pos = offset;
        }
        self.reader.read_exact(buf).map_err(read)?;
        self.pos += buf.len() as u64;
        Ok(())
    }
}

/// Buffered random-access file writer.
#[derive(Debug)]
pub struct FileOutput {
    writer: BufWriter<File>,
    pos: u64,
    high_water: u64,
    declared: Option<u64>,
    role: IoRole,
}

impl FileOutput {
    /// Create (truncate) `path` for writing.
    ///
    /// With `declared_size`, the file is pre-allocated to that length and
    /// writes beyond it are rejected.
    pub fn create(path: &Path, role: IoRole, declared_size: Option<u64>) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::io(role, IoStage::OpenForWrite, e))?;
        if let Some(size) = declared_size {
            file.set_len(size)
                .map_err(|e| Error::io(role, IoStage::OpenForWrite, e))?;
        }
        Ok(Self {
            writer: BufWriter::with_capacity(IO_CACHE_SIZE, file),
            pos: 0,
            high_water: 0,
            declared: declared_size,
            role,
        })
    }

    /// Flush, sync and release the file. Returns its final size.
    pub fn close(self) -> Result<u64> {
        let role = self.role;
        let size = self.size();
        let file = self
            .writer
            .into_inner()
            .map_err(|e| Error::io(role, IoStage::Close, e.into_error()))?;
        file.sync_all()
            .map_err(|e| Error::io(role, IoStage::Close, e))?;
        Ok(size)
    }
}

impl StreamOutput for FileOutput {
    fn size(&self) -> u64 {
        self.declared.unwrap_or(self.high_water)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if let Some(size) = self.declared
            && !in_bounds(offset, data.len(), size)
        {
            return Err(past_end(
                self.role,
                IoStage::Write,
                offset,
                data.len(),
                size,
            ));
        }
        let write = |e| Error::io(self.role, IoStage::Write, e);
        if offset != self.pos {
            self.writer.seek(SeekFrom::Start(offset)).map_err(write)?;
            self.pos = offset;
        }
        self.writer.write_all(data).map_err(write)?;
        self.pos += data.len() as u64;
        self.high_water = self.high_water.max(self.pos);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
