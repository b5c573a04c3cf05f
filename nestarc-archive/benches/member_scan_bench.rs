//! Benchmarks for GZIP member discovery and nested listing
//!
//! This benchmark suite evaluates:
//! - Member scanning throughput over concatenated streams
//! - Cost of bounding the scan to the first member
//! - Recursive listing through a ZIP nested inside a ZIP

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use flate2::{Compression, GzBuilder};
use nestarc_archive::zip::{ZipArchive, ZipWriter};
use nestarc_archive::{ArchiveConfig, Navigator, Registry, gzip};
use nestarc_core::AccessMode;
use std::hint::black_box;
use std::io::{Cursor, Write};

/// Text-like payload that compresses moderately.
fn text_like(size: usize) -> Vec<u8> {
    let text = b"The quick brown fox jumps over the lazy dog. ";
    text.iter().copied().cycle().take(size).collect()
}

/// `count` members of `size` bytes each, back to back.
fn concatenated(count: usize, size: usize) -> Vec<u8> {
    let payload = text_like(size);
    let mut bytes = Vec::new();
    for i in 0..count {
        let mut encoder = GzBuilder::new()
            .filename(format!("part{}.txt", i))
            .write(Vec::new(), Compression::fast());
        encoder.write_all(&payload).expect("compress");
        bytes.extend(encoder.finish().expect("finish"));
    }
    bytes
}

fn bench_member_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("gzip_member_scan");

    for &(count, size) in &[(1usize, 1024 * 1024), (16, 64 * 1024), (256, 4 * 1024)] {
        let bytes = concatenated(count, size);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("all", format!("{}x{}", count, size)),
            &bytes,
            |b, bytes| {
                b.iter(|| {
                    let mut cursor = Cursor::new(bytes.as_slice());
                    black_box(gzip::scan_members(&mut cursor, Some("bench.gz"), -1).expect("scan"))
                })
            },
        );
        group.bench_with_input(
            BenchmarkId::new("first", format!("{}x{}", count, size)),
            &bytes,
            |b, bytes| {
                b.iter(|| {
                    let mut cursor = Cursor::new(bytes.as_slice());
                    black_box(gzip::scan_members(&mut cursor, Some("bench.gz"), 1).expect("scan"))
                })
            },
        );
    }

    group.finish();
}

fn bench_nested_listing(c: &mut Criterion) {
    let mut inner = ZipWriter::new(Vec::new());
    for i in 0..200 {
        inner
            .add_file(&format!("dir{}/file{}.txt", i % 10, i), &text_like(512))
            .expect("add");
    }
    let inner = inner.finish().expect("finish");
    let mut outer = ZipWriter::new(Vec::new());
    outer.add_file("inner.zip", &inner).expect("add");
    let outer = outer.finish().expect("finish");

    let registry = Registry::with_builtins();
    let config = ArchiveConfig::default();

    c.bench_function("nested_zip_recursive_listing", |b| {
        b.iter(|| {
            let mut access = ZipArchive::new(
                Box::new(Cursor::new(outer.clone())),
                None,
                AccessMode::Read,
            )
            .expect("open");
            let mut navigator = Navigator::new(&registry, &config);
            black_box(
                navigator
                    .list_entries(&mut access, "", false, true)
                    .expect("list"),
            )
        })
    });
}

criterion_group!(benches, bench_member_scan, bench_nested_listing);
criterion_main!(benches);
