use std::path::{Path, PathBuf};

use hdelta::{CodecKind, DiffOptions, Error, PatchOptions};
use tempfile::tempdir;

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    (0..size)
        .map(|_| {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
            (s >> 33) as u8
        })
        .collect()
}

fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn file_roundtrip(old: &[u8], new: &[u8], options: &DiffOptions) -> Vec<u8> {
    let dir = tempdir().unwrap();
    let old_path = write(dir.path(), "old", old);
    let new_path = write(dir.path(), "new", new);
    let diff_path = dir.path().join("diff");
    let out_path = dir.path().join("out");
    hdelta::diff_file_with_stats(&old_path, &new_path, &diff_path, options).unwrap();
    hdelta::patch_file(&old_path, &diff_path, &out_path).unwrap();
    std::fs::read(out_path).unwrap()
}

#[test]
fn many_windows_roundtrip() {
    let old = gen_data(300_000, 21);
    let mut new = old[40_000..].to_vec();
    new.extend_from_slice(&gen_data(5_000, 22));
    new.extend_from_slice(&old[..40_000]);
    for i in (0..new.len()).step_by(9_999) {
        new[i] ^= 0x11;
    }
    let options = DiffOptions {
        step_mem_size: 4 << 10,
        match_block_size: 32,
        ..Default::default()
    };
    assert_eq!(file_roundtrip(&old, &new, &options), new);
}

#[test]
fn empty_files() {
    let options = DiffOptions::default();
    assert!(file_roundtrip(b"", b"", &options).is_empty());
    assert_eq!(file_roundtrip(b"", b"fresh", &options), b"fresh");
    assert!(file_roundtrip(b"gone", b"", &options).is_empty());
}

#[test]
fn streaming_copies_shifted_content() {
    let dir = tempdir().unwrap();
    let old = gen_data(1 << 20, 23);
    let mut new = b"prefix that shifts everything".to_vec();
    new.extend_from_slice(&old);
    let old_path = write(dir.path(), "old", &old);
    let new_path = write(dir.path(), "new", &new);
    let diff_path = dir.path().join("diff");

    let stats =
        hdelta::diff_file_with_stats(&old_path, &new_path, &diff_path, &DiffOptions::default())
            .unwrap();
    assert!(stats.copied >= old.len() as u64 - 128, "copied {}", stats.copied);
    assert!(stats.diff_size < 4096, "diff is {} bytes", stats.diff_size);
}

#[test]
fn streaming_and_memory_patches_interchange() {
    let dir = tempdir().unwrap();
    let old = gen_data(100_000, 24);
    let mut new = old.clone();
    new.splice(30_000..30_500, gen_data(700, 25));
    let old_path = write(dir.path(), "old", &old);
    let new_path = write(dir.path(), "new", &new);

    // file diff, memory patch
    let diff_path = dir.path().join("file.diff");
    hdelta::diff_file(&old_path, &new_path, &diff_path).unwrap();
    let file_diff = std::fs::read(&diff_path).unwrap();
    assert_eq!(hdelta::patch(&old, &file_diff).unwrap(), new);

    // memory diff, file patch
    let mem_diff_path = write(dir.path(), "mem.diff", &hdelta::diff(&old, &new).unwrap());
    let out_path = dir.path().join("out");
    hdelta::patch_file(&old_path, &mem_diff_path, &out_path).unwrap();
    assert_eq!(std::fs::read(&out_path).unwrap(), new);

    assert_eq!(
        hdelta::inspect(&file_diff).unwrap().new_size,
        new.len() as u64
    );
}

#[test]
fn stored_codec_over_files() {
    let old = gen_data(20_000, 26);
    let new = [&old[5_000..], &old[..5_000]].concat();
    let options = DiffOptions {
        codec: CodecKind::Stored,
        ..Default::default()
    };
    assert_eq!(file_roundtrip(&old, &new, &options), new);
}

#[test]
fn patch_output_is_overwritten() {
    let dir = tempdir().unwrap();
    let old_path = write(dir.path(), "old", b"0123456789");
    let new_path = write(dir.path(), "new", b"01234");
    let diff_path = dir.path().join("diff");
    let out_path = write(dir.path(), "out", &[0xAA; 100]);
    hdelta::diff_file(&old_path, &new_path, &diff_path).unwrap();
    hdelta::patch_file(&old_path, &diff_path, &out_path).unwrap();
    assert_eq!(std::fs::read(&out_path).unwrap(), b"01234");
}

#[test]
fn patch_stats_and_digest() {
    let dir = tempdir().unwrap();
    let old = gen_data(50_000, 27);
    let new = gen_data(60_000, 28);
    let old_path = write(dir.path(), "old", &old);
    let new_path = write(dir.path(), "new", &new);
    let diff_path = dir.path().join("diff");
    let out_path = dir.path().join("out");

    let ds =
        hdelta::diff_file_with_stats(&old_path, &new_path, &diff_path, &DiffOptions::default())
            .unwrap();
    let ps =
        hdelta::patch_file_with_stats(&old_path, &diff_path, &out_path, &PatchOptions::default())
            .unwrap();
    assert_eq!(ps.old_size, 50_000);
    assert_eq!(ps.new_size, 60_000);
    assert_eq!(ps.diff_size, ds.diff_size);
    assert_eq!(ps.new_sha256, ds.new_sha256);
    assert_eq!(ds.new_sha256.is_some(), cfg!(feature = "file-io"));
}

#[test]
fn wrong_old_file_rejected_before_output() {
    let dir = tempdir().unwrap();
    let old_path = write(dir.path(), "old", &gen_data(1000, 29));
    let new_path = write(dir.path(), "new", &gen_data(1200, 30));
    let other_path = write(dir.path(), "other", &gen_data(999, 31));
    let diff_path = dir.path().join("diff");
    let out_path = dir.path().join("out");
    hdelta::diff_file(&old_path, &new_path, &diff_path).unwrap();

    let err = hdelta::patch_file(&other_path, &diff_path, &out_path).unwrap_err();
    assert!(matches!(err, Error::SizeMismatch { .. }));
    assert!(!out_path.exists());
}

#[test]
fn corrupt_diff_file_rejected() {
    let dir = tempdir().unwrap();
    let old = gen_data(4000, 32);
    let new = gen_data(4000, 33);
    let old_path = write(dir.path(), "old", &old);
    let diff = hdelta::diff_with_options(
        &old,
        &new,
        &DiffOptions {
            codec: CodecKind::Stored,
            ..Default::default()
        },
    )
    .unwrap();
    let mut bad = diff.clone();
    let last = bad.len() - 1;
    bad[last] ^= 0x01;
    let diff_path = write(dir.path(), "diff", &bad);
    let err = hdelta::patch_file(&old_path, &diff_path, &dir.path().join("out")).unwrap_err();
    assert!(err.is_bad_patch(), "{err}");
}

#[test]
fn missing_diff_names_role() {
    let dir = tempdir().unwrap();
    let old_path = write(dir.path(), "old", b"x");
    let err = hdelta::patch_file(&old_path, &dir.path().join("nope"), &dir.path().join("out"))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Io {
            role: hdelta::error::IoRole::Diff,
            stage: hdelta::error::IoStage::Open,
            ..
        }
    ));
}
