// File-path diff and patch.
//
// `diff_file` streams old and new through the block-hash encoder into the
// diff file, closes it, reopens it and verifies it against both inputs
// before returning. `patch_file` validates the header against old, then
// pre-allocates the output to `new_size` and replays into it.
//
// With the `file-io` feature, SHA-256 of the new data is computed while it
// flows through verification (diff) or replay (patch).

use std::path::{Path, PathBuf};

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::delta::decoder::{self, PatchOptions, Scratch};
use crate::delta::encoder::{self, DiffOptions};
use crate::delta::verify;
use crate::error::{Error, IoRole, IoStage, Result};
use crate::stream::{FileInput, FileOutput, StreamInput, StreamOutput};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `diff_file_with_stats()`.
#[derive(Debug, Clone)]
pub struct DiffStats {
    pub old_size: u64,
    pub new_size: u64,
    pub diff_size: u64,
    /// Operations after coalescing.
    pub operations: usize,
    /// New bytes reproduced by copies from old.
    pub copied: u64,
    /// New bytes carried as literals.
    pub inserted: u64,
    /// SHA-256 of the new file (if `file-io` feature is enabled).
    pub new_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `patch_file_with_stats()`.
#[derive(Debug, Clone)]
pub struct PatchStats {
    pub old_size: u64,
    pub diff_size: u64,
    pub new_size: u64,
    pub operations: u64,
    /// SHA-256 of the reconstructed file (if `file-io` feature is enabled).
    pub new_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// In-order SHA-256 over a stream's traffic
// ---------------------------------------------------------------------------

/// Hashes byte ranges seen in strictly ascending, gapless order. Any other
/// access pattern forfeits the digest.
struct OrderedDigest {
    #[cfg(feature = "file-io")]
    hasher: sha2::Sha256,
    next: u64,
    in_order: bool,
}

impl OrderedDigest {
    fn new() -> Self {
        Self {
            #[cfg(feature = "file-io")]
            hasher: sha2::Sha256::new(),
            next: 0,
            in_order: true,
        }
    }

    fn observe(&mut self, offset: u64, data: &[u8]) {
        if !self.in_order || offset != self.next {
            self.in_order = false;
            return;
        }
        #[cfg(feature = "file-io")]
        self.hasher.update(data);
        self.next += data.len() as u64;
    }

    fn finish(self, expected_len: u64) -> Option<[u8; 32]> {
        if !self.in_order || self.next != expected_len {
            return None;
        }
        #[cfg(feature = "file-io")]
        {
            Some(self.hasher.finalize().into())
        }
        #[cfg(not(feature = "file-io"))]
        {
            None
        }
    }
}

/// `StreamInput` wrapper feeding every read into an `OrderedDigest`.
struct HashingInput<'a, I: StreamInput + ?Sized> {
    inner: &'a mut I,
    digest: OrderedDigest,
}

impl<I: StreamInput + ?Sized> StreamInput for HashingInput<'_, I> {
    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.inner.read_at(offset, buf)?;
        self.digest.observe(offset, buf);
        Ok(())
    }
}

/// `StreamOutput` wrapper feeding every write into an `OrderedDigest`.
struct HashingOutput<'a, W: StreamOutput + ?Sized> {
    inner: &'a mut W,
    digest: OrderedDigest,
}

impl<W: StreamOutput + ?Sized> StreamOutput for HashingOutput<'_, W> {
    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.inner.write_at(offset, data)?;
        self.digest.observe(offset, data);
        Ok(())
    }
}

fn check_path(path: &Path, role: IoRole) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::InvalidArgument(format!("invalid {role} file path")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// diff_file
// ---------------------------------------------------------------------------

/// Write a verified patch turning `old_path` into `new_path` to `diff_path`.
/// Returns `diff_path`.
pub fn diff_file(old_path: &Path, new_path: &Path, diff_path: &Path) -> Result<PathBuf> {
    diff_file_with_stats(old_path, new_path, diff_path, &DiffOptions::default())?;
    Ok(diff_path.to_path_buf())
}

/// `diff_file` with custom options, returning statistics.
pub fn diff_file_with_stats(
    old_path: &Path,
    new_path: &Path,
    diff_path: &Path,
    options: &DiffOptions,
) -> Result<DiffStats> {
    check_path(old_path, IoRole::Old)?;
    check_path(new_path, IoRole::New)?;
    check_path(diff_path, IoRole::Diff)?;

    let mut old = FileInput::open(old_path, IoRole::Old)?;
    let mut new = FileInput::open(new_path, IoRole::New)?;
    let mut out = FileOutput::create(diff_path, IoRole::Diff, None)?;
    let summary = encoder::encode_stream(&mut old, &mut new, &mut out, options)?;
    let diff_size = out.close()?;

    let mut diff = FileInput::open(diff_path, IoRole::Diff).map_err(|e| match e {
        Error::Io { source, .. } => Error::io(IoRole::Diff, IoStage::Verify, source),
        other => other,
    })?;
    let mut hashed_new = HashingInput {
        inner: &mut new,
        digest: OrderedDigest::new(),
    };
    verify::verify(
        &mut old,
        &mut hashed_new,
        &mut diff,
        options.codec.build(&options.codec_config),
    )?;
    let new_size = summary.header.new_size;

    Ok(DiffStats {
        old_size: summary.header.old_size,
        new_size,
        diff_size,
        operations: summary.operations,
        copied: summary.copied,
        inserted: summary.inserted,
        new_sha256: hashed_new.digest.finish(new_size),
    })
}

// ---------------------------------------------------------------------------
// patch_file
// ---------------------------------------------------------------------------

/// Apply `diff_path` to `old_path`, writing the result to `new_path`.
/// Returns `new_path`.
pub fn patch_file(old_path: &Path, diff_path: &Path, new_path: &Path) -> Result<PathBuf> {
    patch_file_with_stats(old_path, diff_path, new_path, &PatchOptions::default())?;
    Ok(new_path.to_path_buf())
}

/// `patch_file` with extra codecs, returning statistics.
pub fn patch_file_with_stats(
    old_path: &Path,
    diff_path: &Path,
    new_path: &Path,
    options: &PatchOptions,
) -> Result<PatchStats> {
    check_path(old_path, IoRole::Old)?;
    check_path(diff_path, IoRole::Diff)?;
    check_path(new_path, IoRole::New)?;

    let mut old = FileInput::open(old_path, IoRole::Old)?;
    let mut diff = FileInput::open(diff_path, IoRole::Diff)?;
    let header = decoder::read_header(&mut diff)?;
    let codec = decoder::check_applicable(&header, old.size(), options)?;

    let mut out = FileOutput::create(new_path, IoRole::New, Some(header.new_size))?;
    let mut scratch = Scratch::for_header(&header);
    let mut hashed_out = HashingOutput {
        inner: &mut out,
        digest: OrderedDigest::new(),
    };
    let summary = decoder::decode(&header, codec, &mut scratch, &mut old, &mut diff, &mut hashed_out)?;
    let new_sha256 = hashed_out.digest.finish(header.new_size);
    let new_size = out.close()?;

    Ok(PatchStats {
        old_size: header.old_size,
        diff_size: diff.size(),
        new_size,
        operations: summary.operations,
        new_sha256,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let old_data = b"The quick brown fox jumps over the lazy dog. 1234567890".repeat(50);
        let mut new_data = old_data.clone();
        new_data.splice(100..110, b"a cat sits".iter().copied());
        let old = write(dir.path(), "old.bin", &old_data);
        let new = write(dir.path(), "new.bin", &new_data);
        let diff = dir.path().join("delta.hdp");
        let out = dir.path().join("out.bin");

        assert_eq!(diff_file(&old, &new, &diff).unwrap(), diff);
        assert_eq!(patch_file(&old, &diff, &out).unwrap(), out);
        assert_eq!(std::fs::read(&out).unwrap(), new_data);
    }

    #[test]
    fn stats_report_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let old = write(dir.path(), "old.bin", &[1u8; 4000]);
        let new = write(dir.path(), "new.bin", &[1u8; 5000]);
        let diff = dir.path().join("d");
        let out = dir.path().join("o");

        let ds = diff_file_with_stats(&old, &new, &diff, &DiffOptions::default()).unwrap();
        assert_eq!(ds.old_size, 4000);
        assert_eq!(ds.new_size, 5000);
        assert_eq!(ds.diff_size, std::fs::metadata(&diff).unwrap().len());
        assert_eq!(ds.copied + ds.inserted, 5000);

        let ps = patch_file_with_stats(&old, &diff, &out, &PatchOptions::default()).unwrap();
        assert_eq!(ps.new_size, 5000);
        assert_eq!(ps.diff_size, ds.diff_size);

        #[cfg(feature = "file-io")]
        {
            let expected: [u8; 32] = sha2::Sha256::digest([1u8; 5000]).into();
            assert_eq!(ds.new_sha256, Some(expected));
            assert_eq!(ps.new_sha256, Some(expected));
        }
    }

    #[test]
    fn open_failures_name_role() {
        let dir = tempfile::tempdir().unwrap();
        let present = write(dir.path(), "present", b"data");
        let missing = dir.path().join("missing");
        let diff = dir.path().join("d");

        let err = diff_file(&missing, &present, &diff).unwrap_err();
        assert!(err.to_string().starts_with("open old file failed"), "{err}");
        let err = diff_file(&present, &missing, &diff).unwrap_err();
        assert!(err.to_string().starts_with("open new file failed"), "{err}");
        let err = diff_file(&present, &present, &dir.path().join("no/such/dir/d")).unwrap_err();
        assert!(
            err.to_string().starts_with("open diff file for write failed"),
            "{err}"
        );
    }

    #[test]
    fn empty_path_rejected() {
        let err = patch_file(Path::new(""), Path::new("d"), Path::new("o")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn patch_file_checks_old_size() {
        let dir = tempfile::tempdir().unwrap();
        let old = write(dir.path(), "old", b"0123456789");
        let new = write(dir.path(), "new", b"0123456789abc");
        let other = write(dir.path(), "other", b"012345678");
        let diff = dir.path().join("d");
        diff_file(&old, &new, &diff).unwrap();
        let err = patch_file(&other, &diff, &dir.path().join("o")).unwrap_err();
        assert!(matches!(
            err,
            Error::SizeMismatch {
                expected: 10,
                actual: 9
            }
        ));
    }
}
