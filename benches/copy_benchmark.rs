//! Performance benchmarks for StoreBridge
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use storebridge::copier::Copier;
use storebridge::storage::object::MemoryBucket;
use storebridge::storage::{Directory, Endpoint, LocalStore, MemoryStore};
use storebridge::walk::{TreeListing, TreeWalker};
use tempfile::TempDir;

/// Deterministic payload of the specified size
fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn bench_relay_buffer_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_buffer_size");

    let size = 8 * 1024 * 1024;
    let bucket = MemoryBucket::new("bench");
    bucket.insert("src/large.bin", &payload(size));
    let store = MemoryStore::open(bucket).unwrap();
    let src = store.file(&store.directory("/src"), "large.bin").unwrap();
    let dst = store.file(&store.directory("/dst"), "large.bin").unwrap();

    group.throughput(Throughput::Bytes(size as u64));
    for buffer_size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        group.bench_with_input(
            BenchmarkId::new(
                "memory",
                humansize::format_size(buffer_size as u64, humansize::BINARY),
            ),
            &buffer_size,
            |b, &buffer_size| {
                let copier = Copier::new().with_buffer_size(buffer_size);
                b.iter(|| black_box(copier.copy_file(&src, &dst).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_object_to_local(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_to_local");

    for size in [64 * 1024, 1024 * 1024, 16 * 1024 * 1024] {
        let bucket = MemoryBucket::new("bench");
        bucket.insert("data/file.bin", &payload(size));
        let store = MemoryStore::open(bucket).unwrap();
        let src = store.file(&store.directory("/data"), "file.bin").unwrap();

        let target = TempDir::new().unwrap();
        let local = LocalStore::open(target.path().to_path_buf()).unwrap();
        let dst_dir = local.directory("/");

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("file", humansize::format_size(size as u64, humansize::BINARY)),
            &size,
            |b, _| {
                let copier = Copier::new();
                b.iter(|| black_box(copier.copy_file_to_directory(&src, &dst_dir).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_tree_copy(c: &mut Criterion) {
    let bucket = MemoryBucket::new("bench");
    let data = payload(1024);

    // 10 directories with 100 small files each
    for i in 0..10 {
        for j in 0..100 {
            bucket.insert(&format!("tree/subdir_{}/file_{}.txt", i, j), &data);
        }
    }
    let store = MemoryStore::open(bucket).unwrap();
    let src = store.directory("/tree");
    let dst = store.directory("/mirror");

    c.bench_function("copy_tree_1000_files", |b| {
        let copier = Copier::new();
        b.iter(|| {
            black_box(copier.copy_directory(&src, &dst).unwrap());
            dst.delete_recursively().unwrap();
        });
    });

    c.bench_function("walk_tree_1000_files", |b| {
        b.iter(|| {
            let mut listing = TreeListing::new();
            TreeWalker::new().walk(&src, &mut listing).unwrap();
            black_box(listing.into_entries())
        });
    });
}

criterion_group!(
    benches,
    bench_relay_buffer_sizes,
    bench_object_to_local,
    bench_tree_copy
);

criterion_main!(benches);
