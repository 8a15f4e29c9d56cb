//! Wire-codec and stream-config benchmarks.
//!
//! Measures the hot paths a single `write()`/`read()` call exercises: the
//! fixed-size control-frame encode/decode round trip and the
//! `StreamConfig`/`get_input_buffer_size` arithmetic applied at stream open.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use zonecast_core::{input_buffer_size_bytes, AudioFormat, StreamConfig};
use zonecast_net::{Frame, StreamWireConfig};

fn benchmark_frame_round_trip(c: &mut Criterion) {
    let frame = Frame::Open(StreamWireConfig {
        sample_rate: 48000,
        channel: 2,
        format: 1,
        frame_count: 480,
    });

    c.bench_function("frame_encode", |b| {
        b.iter(|| black_box(frame.encode()));
    });

    let bytes = frame.encode();
    c.bench_function("frame_decode", |b| {
        b.iter(|| black_box(Frame::decode(black_box(&bytes))));
    });
}

fn benchmark_stream_config_open(c: &mut Criterion) {
    c.bench_function("stream_config_new_with_defaults", |b| {
        b.iter(|| black_box(StreamConfig::new(black_box(0), black_box(0), None, 0)));
    });

    let cfg = StreamConfig::new(48000, 0b11, None, 10);
    c.bench_function("stream_config_to_wire", |b| {
        b.iter(|| black_box(cfg.to_wire(black_box(false))));
    });
}

fn benchmark_input_buffer_size(c: &mut Criterion) {
    c.bench_function("input_buffer_size_bytes", |b| {
        b.iter(|| {
            black_box(input_buffer_size_bytes(
                black_box(10),
                black_box(48000),
                black_box(2),
                AudioFormat::Pcm16,
            ))
        });
    });
}

criterion_group!(
    benches,
    benchmark_frame_round_trip,
    benchmark_stream_config_open,
    benchmark_input_buffer_size
);
criterion_main!(benches);
