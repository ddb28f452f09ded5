//! Throughput benchmarks for the chained buffer:
//! - Append/drain cycles at several payload sizes
//! - Zero-copy buffer-to-buffer moves
//! - Substring search across segment boundaries
//! - Line extraction
//!
//! Benchmarks use deterministic inputs to ensure reproducibility.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chainbuf::{ChainBuf, EolStyle};

fn bench_add_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_drain");
    for size in [64usize, 1024, 16 * 1024] {
        let payload = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            let mut buf = ChainBuf::new();
            b.iter(|| {
                buf.add(black_box(payload)).expect("add");
                buf.drain(payload.len()).expect("drain");
            });
        });
    }
    group.finish();
}

fn bench_add_buffer_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_buffer");
    let chunk = vec![0x5Au8; 32 * 1024];
    group.throughput(Throughput::Bytes(1024 * 1024));
    group.bench_function("move_1mib_32_segments", |b| {
        b.iter_batched(
            || {
                let mut src = ChainBuf::new();
                for _ in 0..32 {
                    src.add(&chunk).expect("add");
                }
                src
            },
            |mut src| {
                let mut dst = ChainBuf::new();
                dst.add_buffer(&mut src).expect("add_buffer");
                black_box(dst.len())
            },
            criterion::BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    let mut buf = ChainBuf::new();
    for _ in 0..64 {
        buf.add_reference(vec![b'x'; 1024], || {}).expect("add");
    }
    buf.add_reference(b"needle".to_vec(), || {}).expect("add");
    group.throughput(Throughput::Bytes(buf.len() as u64));
    group.bench_function("cross_segment_64kib", |b| {
        b.iter(|| {
            let hit = buf.search(black_box(b"needle"), None).expect("search");
            black_box(hit.map(|c| c.position()))
        });
    });
    group.finish();
}

fn bench_read_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_line");
    group.bench_function("crlf_headers", |b| {
        b.iter_batched(
            || {
                let mut buf = ChainBuf::new();
                for _ in 0..32 {
                    buf.add(b"Header-Name: header value\r\n").expect("add");
                }
                buf
            },
            |mut buf| {
                while let Some(line) = buf.read_line(EolStyle::Crlf).expect("read_line") {
                    black_box(line.len());
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_add_drain,
    bench_add_buffer_move,
    bench_search,
    bench_read_line
);
criterion_main!(benches);
