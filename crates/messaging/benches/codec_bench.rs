use common::SagaId;
use criterion::{Criterion, criterion_group, criterion_main};
use messaging::{DelimitedCodec, FramedCodec, MessageCodec, MessageName, OrderPayload, SagaMessage};

fn make_message(items: usize) -> SagaMessage {
    SagaMessage::new(
        MessageName::START_SUBTRACT_STOCK,
        SagaId::new(1_024),
        OrderPayload {
            order_id: "8a7d40f4-91d3-4bb1-9f51-0a4f7e0c2b11".to_string(),
            user_id: "0f3c9d0e-64a4-4e53-8d0c-1b7e8f3a2c55".to_string(),
            items: (0..items)
                .map(|i| format!("00000000-0000-0000-0000-{i:012}"))
                .collect(),
            total_cost: 4_200,
            paid: false,
        },
    )
}

fn bench_framed_encode(c: &mut Criterion) {
    let message = make_message(10);

    c.bench_function("codec/framed_encode_10_items", |b| {
        b.iter(|| FramedCodec.encode(&message).unwrap());
    });
}

fn bench_framed_decode(c: &mut Criterion) {
    let record = FramedCodec.encode(&make_message(10)).unwrap();

    c.bench_function("codec/framed_decode_10_items", |b| {
        b.iter(|| FramedCodec.decode(&record).unwrap());
    });
}

fn bench_delimited_decode(c: &mut Criterion) {
    let record = DelimitedCodec.encode(&make_message(10)).unwrap();

    c.bench_function("codec/delimited_decode_10_items", |b| {
        b.iter(|| DelimitedCodec.decode(&record).unwrap());
    });
}

fn bench_framed_decode_large(c: &mut Criterion) {
    let record = FramedCodec.encode(&make_message(500)).unwrap();

    c.bench_function("codec/framed_decode_500_items", |b| {
        b.iter(|| FramedCodec.decode(&record).unwrap());
    });
}

criterion_group!(
    benches,
    bench_framed_encode,
    bench_framed_decode,
    bench_delimited_decode,
    bench_framed_decode_large,
);
criterion_main!(benches);
