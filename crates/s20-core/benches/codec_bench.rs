//! Criterion benchmarks for the S20 binary codec.
//!
//! Discovery decodes every datagram that reaches the socket during the
//! window, including unrelated broadcast traffic, so both the accept and the
//! reject paths are measured.
//!
//! Run with:
//! ```bash
//! cargo bench --package s20-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use s20_core::protocol::codec::{decode_message, encode_message};
use s20_core::protocol::messages::{
    AnnounceMessage, ControlMessage, S20Message, SubscribeAckMessage, SubscribeRequestMessage,
};
use s20_core::HardwareId;

const ID: HardwareId = HardwareId::new([0xac, 0xcf, 0x23, 0x12, 0x34, 0x56]);

// ── Message fixtures ──────────────────────────────────────────────────────────

fn fixtures() -> Vec<(&'static str, S20Message)> {
    vec![
        ("DiscoverProbe", S20Message::DiscoverProbe),
        (
            "DiscoverAnnounce",
            S20Message::DiscoverAnnounce(AnnounceMessage {
                status: 0,
                hardware_id: ID,
                device_type: *b"SOC002",
                clock: 0x1234_5678,
                on: true,
            }),
        ),
        (
            "SubscribeRequest",
            S20Message::SubscribeRequest(SubscribeRequestMessage { hardware_id: ID }),
        ),
        (
            "SubscribeAck",
            S20Message::SubscribeAck(SubscribeAckMessage { hardware_id: ID, on: false }),
        ),
        (
            "ControlRequest",
            S20Message::ControlRequest(ControlMessage { hardware_id: ID, on: true }),
        ),
        (
            "ControlAck",
            S20Message::ControlAck(ControlMessage { hardware_id: ID, on: true }),
        ),
    ]
}

/// Benchmarks `encode_message` for every message type.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_message");
    for (name, msg) in fixtures() {
        group.bench_with_input(BenchmarkId::new("msg", name), &msg, |b, msg| {
            b.iter(|| encode_message(black_box(msg)).expect("encode must succeed"))
        });
    }
    group.finish();
}

/// Benchmarks `decode_message` for every message type.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_message");
    for (name, msg) in fixtures() {
        let bytes = encode_message(&msg).expect("encode must succeed for benchmark setup");
        group.bench_with_input(BenchmarkId::new("msg", name), &bytes, |b, bytes| {
            b.iter(|| decode_message(black_box(bytes)).expect("decode must succeed"))
        });
    }
    group.finish();
}

/// Benchmarks rejection of datagrams that are not S20 frames.
fn bench_reject_noise(c: &mut Criterion) {
    let mut group = c.benchmark_group("reject_noise");

    let ssdp = b"M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\n\r\n".to_vec();
    group.bench_function("foreign_datagram", |b| {
        b.iter(|| decode_message(black_box(&ssdp)).is_err())
    });

    let mut truncated = encode_message(&fixtures()[1].1).expect("encode");
    truncated.truncate(20);
    group.bench_function("truncated_announce", |b| {
        b.iter(|| decode_message(black_box(&truncated)).is_err())
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_reject_noise);
criterion_main!(benches);
