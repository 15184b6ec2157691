use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use serial_line::{ByteRing, EncodingAdapter};
use std::hint::black_box;
use std::time::Duration;

pub fn bench_ring(c: &mut Criterion) {
    let chunk = [0xA5u8; 64];
    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Bytes(4096));
    group.bench_function("append_take_4k", |b| {
        let mut ring = ByteRing::with_capacity(4096);
        let mut out = Vec::with_capacity(64);
        b.iter(|| {
            for _ in 0..64 {
                ring.append(black_box(&chunk));
            }
            while !ring.is_empty() {
                out.clear();
                ring.take_extend(64, &mut out);
                black_box(&out);
            }
        })
    });
    group.bench_function("find_delimiter", |b| {
        let mut ring = ByteRing::with_capacity(4096);
        ring.append(&[b'x'; 4000]);
        ring.append(b"\r\n");
        b.iter(|| black_box(ring.find(b"\r\n")))
    });
    group.finish();
}

pub fn bench_codecs(c: &mut Criterion) {
    let text = "The quick brown fox jumps over the lazy dog. Grüße, ça va? ".repeat(16);
    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(text.len() as u64));
    for name in ["us-ascii", "utf-8", "utf-16le"] {
        let adapter = EncodingAdapter::for_name(name).unwrap();
        let bytes = adapter.encode(&text).unwrap();
        group.bench_function(format!("encode_{name}"), |b| {
            b.iter(|| black_box(adapter.encode(black_box(&text)).unwrap()))
        });
        group.bench_function(format!("decode_{name}"), |b| {
            b.iter(|| black_box(adapter.decode_all(black_box(&bytes))))
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_ring, bench_codecs
}
criterion_main!(benches);
