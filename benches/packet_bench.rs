use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use bidcos_engine::core::address::Address;
use bidcos_engine::core::codec::BidCoSCodec;
use bidcos_engine::core::packet::Packet;
use bidcos_engine::queue::{QueueEntry, QueueFormat, QueueType};
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

fn sample_packet(payload_len: usize) -> Packet {
    Packet::new(
        0x1A,
        0xA0,
        0x01,
        Address::new(0x1D8A4C),
        Address::new(0x200A1B),
        (0..payload_len).map(|i| i as u8).collect(),
    )
}

#[allow(clippy::unwrap_used)]
fn bench_packet_hex(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_hex");
    let payload_sizes = [0usize, 2, 16, 64, 246];

    for &size in &payload_sizes {
        let packet = sample_packet(size);
        let line = format!("A{}\r\n", packet.serialize());
        group.throughput(Throughput::Bytes(line.len() as u64));

        group.bench_function(format!("serialize_{size}b"), |b| {
            b.iter(|| std::hint::black_box(packet.serialize()));
        });
        group.bench_function(format!("parse_{size}b"), |b| {
            b.iter(|| std::hint::black_box(Packet::parse(&line, true)));
        });
    }
    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_codec");
    let packet = sample_packet(16);
    let mut stream = String::new();
    for _ in 0..64 {
        stream.push('A');
        stream.push_str(&packet.serialize());
        stream.push_str("\r\n");
    }
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("decode_64_lines", |b| {
        b.iter_batched(
            || BytesMut::from(stream.as_bytes()),
            |mut buf| {
                let mut codec = BidCoSCodec::default();
                while let Some(frame) = codec.decode(&mut buf).unwrap() {
                    std::hint::black_box(frame);
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("encode_64_lines", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(stream.len() + 128);
            let mut codec = BidCoSCodec::default();
            for _ in 0..64 {
                codec.encode(&packet, &mut buf).unwrap();
            }
            std::hint::black_box(buf);
        });
    });
    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_queue_format(c: &mut Criterion) {
    let entries: Vec<QueueEntry> = (0..32)
        .map(|i| QueueEntry::Packet(Arc::new(sample_packet(i % 12))))
        .collect();
    let text = QueueFormat::CURRENT
        .encode(QueueType::Config, entries.iter())
        .unwrap();
    let registry = bidcos_engine::protocol::registry::MessageRegistry::new();

    c.bench_function("queue_encode_32", |b| {
        b.iter(|| std::hint::black_box(QueueFormat::CURRENT.encode(QueueType::Config, entries.iter()).unwrap()));
    });
    c.bench_function("queue_decode_32", |b| {
        b.iter(|| std::hint::black_box(QueueFormat::CURRENT.decode(&text, &registry).unwrap()));
    });
}

criterion_group!(benches, bench_packet_hex, bench_codec, bench_queue_format);
criterion_main!(benches);
