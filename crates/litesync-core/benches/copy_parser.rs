use std::hint::black_box;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use litesync_core::CopyTextParser;

const ROWS: usize = 1_000_000;
const CHUNK_SIZE: usize = 64 * 1024;

/// Mixed rows: ids, plain text, escaped text, nulls and JSON.
fn copy_stream() -> Vec<Bytes> {
    let mut data = Vec::with_capacity(ROWS * 64);
    for i in 0..ROWS {
        data.extend_from_slice(i.to_string().as_bytes());
        data.extend_from_slice(b"\tissue title ");
        data.extend_from_slice((i % 97).to_string().as_bytes());
        match i % 4 {
            0 => data.extend_from_slice(b"\tline one\\nline two\\twith tab"),
            1 => data.extend_from_slice(b"\t\\N"),
            2 => data.extend_from_slice(b"\t{\"a\": \"b\\\\\"}"),
            _ => data.extend_from_slice(b"\t"),
        }
        data.extend_from_slice(b"\tt\n");
    }
    let data = Bytes::from(data);
    (0..data.len())
        .step_by(CHUNK_SIZE)
        .map(|start| data.slice(start..(start + CHUNK_SIZE).min(data.len())))
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let chunks = copy_stream();
    let total: usize = chunks.iter().map(Bytes::len).sum();

    let mut group = c.benchmark_group("copy_parser");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(total as u64));
    group.bench_function("mixed_1m_rows", |b| {
        b.iter(|| {
            let mut parser = CopyTextParser::new();
            let mut fields = 0usize;
            for chunk in &chunks {
                for field in parser.parse(chunk.clone()).unwrap() {
                    black_box(&field);
                    fields += 1;
                }
            }
            parser.finish().unwrap();
            assert_eq!(fields, ROWS * 4);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
