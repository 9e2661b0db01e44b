//! Per-packet decision latency benchmarks for tlb-core.
//!
//! Measures:
//! - get_path() for an established flow (re-validation + reroute check)
//! - get_path() for a brand-new flow (full tiered selection)
//! - flow_send() + flow_recv() feedback pair
//! - classify() of a single path
//!
//! Run with: cargo bench --package tlb-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tlb_core::{SimTime, TlbConfig, TlbEngine};

const SRC: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
const DST: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 1, 1));

fn engine(paths: u32) -> TlbEngine {
    let mut e = TlbEngine::new(TlbConfig {
        seed: Some(0x71B),
        ..TlbConfig::default()
    });
    e.add_address_with_group(SRC, 0);
    e.add_address_with_group(DST, 1);
    for p in 0..paths {
        e.add_available_path(1, p);
        e.probe_recv(p, DST, 1_500, false, Duration::from_micros(80 + 10 * p as u64), SimTime::ZERO)
            .unwrap();
    }
    e
}

fn bench_get_path_established(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_path_established");
    for paths in [4u32, 16, 64] {
        let mut e = engine(paths);
        e.get_path(1, SRC, DST, SimTime::ZERO).unwrap();
        let mut t = 0u64;
        group.bench_function(format!("{paths}paths"), |b| {
            b.iter(|| {
                t += 1;
                black_box(e.get_path(1, SRC, DST, SimTime::from_nanos(t)).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_get_path_new_flow(c: &mut Criterion) {
    let mut e = engine(16);
    let mut flow = 0u64;
    c.bench_function("get_path_new_flow_16paths", |b| {
        b.iter(|| {
            flow += 1;
            black_box(e.get_path(flow, SRC, DST, SimTime::ZERO).unwrap());
        });
    });
}

fn bench_feedback_pair(c: &mut Criterion) {
    let mut e = engine(16);
    let p = e.get_path(1, SRC, DST, SimTime::ZERO).unwrap();
    let mut t = 0u64;
    c.bench_function("flow_send_recv_pair", |b| {
        b.iter(|| {
            t += 1_000;
            let now = SimTime::from_nanos(t);
            e.flow_send(1, DST, p, 1_500, false, now).unwrap();
            e.flow_recv(1, p, DST, 1_500, false, Duration::from_micros(90), now)
                .unwrap();
        });
    });
}

fn bench_classify(c: &mut Criterion) {
    let e = engine(4);
    c.bench_function("classify_single_path", |b| {
        b.iter(|| black_box(e.classify(1, black_box(2))));
    });
}

criterion_group!(
    benches,
    bench_get_path_established,
    bench_get_path_new_flow,
    bench_feedback_pair,
    bench_classify,
);
criterion_main!(benches);
