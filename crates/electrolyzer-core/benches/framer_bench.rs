//! Criterion benchmarks for the device line framer and JSON line codec.
//!
//! The controller emits a telemetry line every few hundred milliseconds, so
//! throughput is never the bottleneck; these benches exist to catch
//! accidental quadratic behaviour in the buffering logic.
//!
//! Run with:
//! ```bash
//! cargo bench --package electrolyzer-core --bench framer_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use electrolyzer_core::{decode_device_line, LineFramer};

const LINE: &str = "{\"water\":55.2,\"production\":80,\"voltage\":1.92,\"current\":12.4,\
                    \"temperature\":61.3,\"pressure\":29.8,\"mode\":\"auto\"}\n";

fn make_stream(lines: usize) -> Vec<u8> {
    LINE.repeat(lines).into_bytes()
}

fn bench_framer_chunk_sizes(c: &mut Criterion) {
    let stream = make_stream(256);
    let mut group = c.benchmark_group("framer_push");

    for chunk_size in [1usize, 16, 512, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &size| {
                b.iter(|| {
                    let mut framer = LineFramer::new();
                    let mut count = 0;
                    for chunk in stream.chunks(size) {
                        count += framer.push(black_box(chunk)).len();
                    }
                    count
                })
            },
        );
    }

    group.finish();
}

fn bench_decode_device_line(c: &mut Criterion) {
    let line = LINE.trim_end();
    c.bench_function("decode_device_line", |b| {
        b.iter(|| decode_device_line(black_box(line)))
    });
}

criterion_group!(benches, bench_framer_chunk_sizes, bench_decode_device_line);
criterion_main!(benches);
