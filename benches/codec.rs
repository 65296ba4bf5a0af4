//! Reference codec and packet benchmarks.
//!
//! Benchmarks the per-call wire work at different argument counts:
//! - Argument counts: 1, 8, 64
//! - Mixed argument lists (plain values, callbacks, listeners, instances)
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::{Value, json};
use socket_rmi::identifiers::AckId;
use socket_rmi::protocol::{
    CallbackDescriptor, InstanceDescriptor, ListenerDescriptor, Packet, decode_args, encode_args,
};
use socket_rmi::{CallbackId, Namespace, WireValue};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const ARG_COUNTS: &[usize] = &[1, 8, 64];

// ============================================================================
// Fixtures
// ============================================================================

fn mixed_args(count: usize) -> Vec<WireValue> {
    let namespace = Namespace::root().child("TestClass.1");

    (0..count)
        .map(|i| match i % 4 {
            0 => WireValue::plain(json!({"index": i, "label": "value"})),
            1 => WireValue::Callback(CallbackDescriptor {
                namespace: namespace.clone(),
                id: CallbackId::new(i as u64),
            }),
            2 => WireValue::Listener(ListenerDescriptor {
                namespace: namespace.child(format!("listener.{i}")),
                events: vec!["onTestEvent".into(), "onTestEvent2".into()],
            }),
            _ => WireValue::from(InstanceDescriptor {
                namespace: namespace.clone(),
                actions: vec!["rpcMethod1".into(), "rpcMethod2".into()],
            }),
        })
        .collect()
}

// ============================================================================
// Benchmark: Argument Lists
// ============================================================================

fn bench_args(c: &mut Criterion) {
    let mut group = c.benchmark_group("args");

    for &count in ARG_COUNTS {
        let args = mixed_args(count);
        let encoded = encode_args(&args);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("encode", count), &args, |b, args| {
            b.iter(|| encode_args(args));
        });

        group.bench_with_input(BenchmarkId::new("decode", count), &encoded, |b, encoded| {
            b.iter(|| decode_args(encoded.clone()).expect("decode"));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Packets
// ============================================================================

fn bench_packets(c: &mut Criterion) {
    let mut group = c.benchmark_group("packets");

    for &count in ARG_COUNTS {
        let packet = Packet::event(
            "/TestClass.1/rpcMethod2",
            encode_args(&mixed_args(count)),
            Some(AckId::new(42)),
        );
        let text = serde_json::to_string(&packet).expect("serialize");

        group.bench_with_input(BenchmarkId::new("serialize", count), &packet, |b, packet| {
            b.iter(|| serde_json::to_string(packet).expect("serialize"));
        });

        group.bench_with_input(BenchmarkId::new("parse", count), &text, |b, text| {
            b.iter(|| serde_json::from_str::<Packet>(text).expect("parse"));
        });
    }

    let ack = Packet::ack(AckId::new(42), WireValue::plain(Value::from(6)).encode());
    group.bench_function("ack_round_trip", |b| {
        b.iter(|| {
            let text = serde_json::to_string(&ack).expect("serialize");
            serde_json::from_str::<Packet>(&text).expect("parse")
        });
    });

    group.finish();
}

criterion_group!(benches, bench_args, bench_packets);
criterion_main!(benches);
