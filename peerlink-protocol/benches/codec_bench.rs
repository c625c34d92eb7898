use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use peerlink_protocol::payload::Payload;
use peerlink_protocol::system::{SystemMessage, MAX_SYSTEM_MESSAGE_SIZE};

fn bench_payload_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_write");
    group.throughput(Throughput::Bytes(1024));

    group.bench_function("u64_stream", |b| {
        let mut payload = Payload::new(1024);
        b.iter(|| {
            payload.reset(1024);
            for i in 0..128u64 {
                payload.write_u64(black_box(i)).unwrap();
            }
            black_box(payload.pack().len());
        });
    });

    group.finish();
}

fn bench_payload_read(c: &mut Criterion) {
    let mut source = Payload::new(1024);
    for i in 0..128u64 {
        source.write_u64(i).unwrap();
    }
    let frame = source.pack().to_vec();

    c.bench_function("payload_read_u64_stream", |b| {
        let mut payload = Payload::new(1024);
        b.iter(|| {
            payload.load(black_box(&frame));
            let mut acc = 0u64;
            for _ in 0..128 {
                acc = acc.wrapping_add(payload.read_u64().unwrap());
            }
            black_box(acc);
        });
    });
}

fn bench_packed_u64(c: &mut Criterion) {
    c.bench_function("packed_u64_roundtrip", |b| {
        let mut payload = Payload::new(16);
        b.iter(|| {
            let value = black_box(0x0102_0304_0506u64);
            let bytes = Payload::calc_packed_u64_bytes(value);
            payload.reset(16);
            payload.write_packed_u64(bytes, value).unwrap();
            payload.seek(0).unwrap();
            black_box(payload.read_packed_u64(bytes).unwrap());
        });
    });
}

fn bench_system_message(c: &mut Criterion) {
    let mut payload = Payload::new(MAX_SYSTEM_MESSAGE_SIZE);
    let pong = SystemMessage::Pong {
        sequence: 0x1234,
        server_time: 1_700_000_000_000_000_000,
    };
    pong.encode(&mut payload).unwrap();
    let frame = payload.pack().to_vec();

    c.bench_function("system_pong_encode", |b| {
        let mut out = Payload::new(MAX_SYSTEM_MESSAGE_SIZE);
        b.iter(|| {
            black_box(&pong).encode(&mut out).unwrap();
            black_box(out.pack().len());
        });
    });

    c.bench_function("system_pong_decode", |b| {
        b.iter(|| {
            black_box(SystemMessage::decode(black_box(&frame)).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_payload_write,
    bench_payload_read,
    bench_packed_u64,
    bench_system_message
);
criterion_main!(benches);
