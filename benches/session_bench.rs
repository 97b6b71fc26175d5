//! Pack, extract and flush benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zipbox_core::{pack_to_with_config, ArchiveSession, Config, LogVisitor, VisitAction};
use zipbox_testing::fixtures::create_bulk_tree;
use zipbox_testing::TestDir;

fn bench_config(scratch: &Path) -> Config {
    Config {
        verbose: false,
        scratch_dir: Some(scratch.to_path_buf()),
        ..Default::default()
    }
}

/// Pack `count` files of `size` bytes into `dir/bench.zip`
fn create_test_archive(dir: &TestDir, count: usize, size: usize) -> PathBuf {
    let src = create_bulk_tree(dir, "src", count, size).unwrap();
    let archive = dir.join("bench.zip");
    let config = bench_config(&dir.join("scratch"));
    let visitor = LogVisitor::from_config(&config, VisitAction::Pack);
    pack_to_with_config(&src, &archive, visitor, false, &config).unwrap();
    archive
}

/// Benchmark packing trees of different shapes
fn bench_pack(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack");
    group.sample_size(10);

    for (count, size) in [(100, 1024), (20, 512 * 1024)] {
        let dir = TestDir::new().unwrap();
        let src = create_bulk_tree(&dir, "src", count, size).unwrap();
        let config = bench_config(&dir.join("scratch"));

        group.bench_with_input(
            BenchmarkId::new("pack_to", format!("{}x{}", count, size)),
            &src,
            |b, src| {
                b.iter(|| {
                    let out = TempDir::new().unwrap();
                    let visitor = LogVisitor::from_config(&config, VisitAction::Pack);
                    pack_to_with_config(
                        black_box(src),
                        out.path().join("out.zip"),
                        visitor,
                        false,
                        &config,
                    )
                    .unwrap();
                });
            },
        );
    }

    group.finish();
}

/// Benchmark extracting a whole archive
fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    group.sample_size(10);

    let dir = TestDir::new().unwrap();
    let archive = create_test_archive(&dir, 100, 10240); // 100 files, 10KB each

    group.bench_function("extract_100_files", |b| {
        b.iter(|| {
            let out = TempDir::new().unwrap();
            let mut session =
                ArchiveSession::open_with_config(&archive, bench_config(&dir.join("scratch")))
                    .unwrap();
            session.extract_to(black_box(out.path()), &[]).unwrap();
        });
    });

    group.finish();
}

/// Benchmark a flush that rewrites the archive after one added member
fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");
    group.sample_size(10);

    group.bench_function("add_one_and_flush_100_files", |b| {
        b.iter_with_setup(
            || {
                let dir = TestDir::new().unwrap();
                let archive = create_test_archive(&dir, 100, 10240);
                let extra = dir.create_file("extra.txt", b"extra").unwrap();
                (dir, archive, extra)
            },
            |(dir, archive, extra)| {
                let mut session =
                    ArchiveSession::open_with_config(&archive, bench_config(&dir.join("scratch")))
                        .unwrap();
                session.add_file("extra.txt", &extra).unwrap();
                session.close().unwrap();
            },
        );
    });

    group.finish();
}

criterion_group!(benches, bench_pack, bench_extract, bench_flush);
criterion_main!(benches);
