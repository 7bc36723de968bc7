use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use hdelta::matcher::rolling::BlockHash;
use hdelta::matcher::table::BlockTable;
use hdelta::{CodecKind, DiffOptions};
use std::fs;
use std::path::Path;

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((s >> 33) as u8);
    }
    out
}

fn mutate(base: &[u8], stride: usize) -> Vec<u8> {
    let mut out = base.to_vec();
    for i in (0..out.len()).step_by(stride.max(1)) {
        out[i] = out[i].wrapping_add(1);
    }
    out
}

fn options(codec: CodecKind) -> DiffOptions {
    DiffOptions {
        codec,
        ..Default::default()
    }
}

fn codecs() -> Vec<(&'static str, CodecKind)> {
    ["stored", "zlib", "lzma"]
        .into_iter()
        .filter_map(|name| CodecKind::from_name(name).map(|kind| (name, kind)))
        .collect()
}

fn write_ratio_snapshot() {
    let old = gen_data(2 * 1024 * 1024, 123);
    let new = mutate(&old, 4096);
    let mut csv = String::from("codec,diff_bytes,new_bytes,ratio\n");
    for (name, kind) in codecs() {
        let diff = hdelta::diff_with_options(&old, &new, &options(kind)).unwrap();
        let ratio = diff.len() as f64 / new.len() as f64;
        csv.push_str(&format!("{name},{},{},{}\n", diff.len(), new.len(), ratio));
    }
    let out_dir = Path::new("target/criterion/custom_reports");
    let _ = fs::create_dir_all(out_dir);
    let _ = fs::write(out_dir.join("ratio_snapshot.csv"), csv);
}

fn bench_diff_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("diff_speed_mb_s");
    g.sample_size(10);
    for size in [64 * 1024usize, 1024 * 1024, 4 * 1024 * 1024] {
        let old = gen_data(size, 1);
        let new = mutate(&old, 1024);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let diff = hdelta::diff(black_box(&old), black_box(&new)).unwrap();
                black_box(diff);
            });
        });
    }
    g.finish();
}

fn bench_patch_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("patch_speed_mb_s");
    for size in [64 * 1024usize, 1024 * 1024, 4 * 1024 * 1024] {
        let old = gen_data(size, 2);
        let new = mutate(&old, 2048);
        let diff = hdelta::diff(&old, &new).unwrap();
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let out = hdelta::patch(black_box(&old), black_box(&diff)).unwrap();
                black_box(out);
            });
        });
    }
    g.finish();
}

fn bench_ratio_vs_codec(c: &mut Criterion) {
    write_ratio_snapshot();
    let mut g = c.benchmark_group("diff_vs_codec");
    g.sample_size(10);
    let old = gen_data(1024 * 1024, 3);
    let new = mutate(&old, 4096);
    for (name, kind) in codecs() {
        let opts = options(kind);
        g.bench_function(name, |b| {
            b.iter(|| {
                let diff = hdelta::diff_with_options(&old, &new, &opts).unwrap();
                black_box(diff.len() as f64 / new.len() as f64);
            });
        });
    }
    g.finish();
}

fn bench_block_index(c: &mut Criterion) {
    let mut g = c.benchmark_group("block_index_build");
    let block = 64usize;
    for size in [1usize << 20, 1 << 23] {
        let old = gen_data(size, 4);
        let hasher = BlockHash::new(block);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut table = BlockTable::new((size / block) as u64, block);
                for (i, chunk) in old.chunks_exact(block).enumerate() {
                    table.insert(hasher.checksum(chunk), (i * block) as u64);
                }
                black_box(table.lookup(0x1234_5678));
            });
        });
    }
    g.finish();
}

fn bench_file_roundtrip(c: &mut Criterion) {
    let mut g = c.benchmark_group("file_roundtrip");
    g.sample_size(10);
    let dir = tempfile::tempdir().unwrap();
    let size = 8 * 1024 * 1024usize;
    let old_path = dir.path().join("old");
    let new_path = dir.path().join("new");
    let diff_path = dir.path().join("diff");
    let out_path = dir.path().join("out");
    let old = gen_data(size, 5);
    fs::write(&old_path, &old).unwrap();
    fs::write(&new_path, mutate(&old, 8192)).unwrap();

    g.throughput(Throughput::Bytes(size as u64));
    g.bench_function("diff_then_patch", |b| {
        b.iter(|| {
            hdelta::diff_file(&old_path, &new_path, &diff_path).unwrap();
            hdelta::patch_file(&old_path, &diff_path, &out_path).unwrap();
        });
    });
    g.finish();
}

fn bench_real_world_scenarios(c: &mut Criterion) {
    let mut g = c.benchmark_group("real_world_scenarios");
    g.sample_size(10);
    let scenarios = [
        ("software_update", 4 * 1024 * 1024usize, 1024usize),
        ("document_versioning", 512 * 1024usize, 256usize),
        ("database_snapshot", 4 * 1024 * 1024usize, 4096usize),
        ("compressed_payload", 2 * 1024 * 1024usize, 16384usize),
    ];

    for (name, size, stride) in scenarios {
        let old = gen_data(size, size as u64);
        let new = mutate(&old, stride);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_function(name, |b| {
            b.iter(|| {
                let diff = hdelta::diff(&old, &new).unwrap();
                let out = hdelta::patch(&old, &diff).unwrap();
                black_box(out);
            });
        });
    }
    g.finish();
}

criterion_group!(
    benches,
    bench_diff_speed,
    bench_patch_speed,
    bench_ratio_vs_codec,
    bench_block_index,
    bench_file_roundtrip,
    bench_real_world_scenarios
);
criterion_main!(benches);
