use bates::{
    BatesNumber, DispatchConfig, Dispatcher, ManifestAnnotator, PoolConfig, WorkerPool, blank_tiff,
};
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::{fs, path::PathBuf, time::Instant};
use tokio::runtime::Builder;

const TOTAL_FILES: usize = 16;
const PAGES_PER_FILE: u64 = 4;

fn fixtures() -> (tempfile::TempDir, Vec<PathBuf>, Dispatcher) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir_all(&input).unwrap();
    fs::create_dir_all(&output).unwrap();

    let files = (0..TOTAL_FILES)
        .map(|i| {
            let path = input.join(format!("doc{i:03}.tif"));
            fs::write(&path, blank_tiff(PAGES_PER_FILE)).unwrap();
            path
        })
        .collect();
    let dispatcher = Dispatcher::new(DispatchConfig::new(output, BatesNumber::with_prefix("BENCH_")));
    (dir, files, dispatcher)
}

/// Endorses the batch in the caller's thread with no process isolation.
fn bench_sync(c: &mut Criterion) {
    let (_dir, files, dispatcher) = fixtures();
    let annotator = ManifestAnnotator::default();

    let mut group = c.benchmark_group("sync");
    group.throughput(Throughput::Elements(TOTAL_FILES as u64));
    group.bench_function(format!("files/{TOTAL_FILES}"), |b| {
        b.iter(|| {
            let report = dispatcher.run_sync(&annotator, &files).unwrap();
            black_box(report);
        });
    });
    group.finish();
}

/// Endorses the batch through the pool, one forked worker per file.
fn bench_async(c: &mut Criterion) {
    let (_dir, files, dispatcher) = fixtures();

    let mut group = c.benchmark_group("async");
    group.throughput(Throughput::Elements(TOTAL_FILES as u64));

    for workers in [1, 2, 4, 8] {
        let rt = Builder::new_multi_thread().enable_all().build().unwrap();
        let pool = rt.block_on(async {
            WorkerPool::new(ManifestAnnotator::default, PoolConfig::with_capacity(workers))
        });

        group.bench_function(format!("workers/{workers}/files/{TOTAL_FILES}"), |b| {
            b.to_async(&rt).iter_custom(|iters| {
                let (files, dispatcher, pool) = (&files, &dispatcher, &pool);
                async move {
                    let start = Instant::now();
                    for _ in 0..iters {
                        let report = dispatcher.run_async(pool, files).await.unwrap();
                        black_box(report);
                    }
                    start.elapsed()
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sync, bench_async);
criterion_main!(benches);
