//! Flood suppression performance benchmarks
//!
//! Benchmarks for the per-packet hot path:
//! - Probability updates on reception
//! - Expected-receiver estimation
//! - Full ingress of new and duplicate frames
//!
//! Run with: cargo bench -p ripple-flood

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use ripple_core::{
    ArpTable, EtherHeader, FloodFrame, FloodHeader, LinkTable, MacAddress, SimulationIdentity,
};
use ripple_flood::{
    FloodConfig, FloodController, FloodOutput, FloodSettings, ForwardDecisionEngine,
    SequenceProbabilityTable,
};

const ETHERTYPE: u16 = 0x0941;

// ============================================================================
// Helper Functions
// ============================================================================

fn make_id(c: char) -> SimulationIdentity {
    SimulationIdentity::new(c).unwrap()
}

/// 'A' at the center of `peer_count` neighbors with varied link quality
fn star(peer_count: usize) -> LinkTable<SimulationIdentity> {
    let table = LinkTable::new();
    for i in 0..peer_count {
        let peer = make_id((b'B' + (i % 25) as u8) as char);
        table.set_symmetric(make_id('A'), peer, 0.3 + (i % 7) as f64 * 0.1);
    }
    table
}

fn config(settings: FloodSettings) -> FloodConfig<SimulationIdentity> {
    FloodConfig::builder()
        .ethertype(ETHERTYPE)
        .ip(make_id('A'))
        .bcast_ip(make_id('Z'))
        .eth(make_id('A').mac())
        .count(3)
        .settings(FloodSettings {
            rng_seed: Some(42),
            ..settings
        })
        .build()
        .unwrap()
}

type BenchController =
    FloodController<SimulationIdentity, LinkTable<SimulationIdentity>, ArpTable<SimulationIdentity>>;

fn node() -> BenchController {
    FloodController::new(
        config(FloodSettings::default()),
        Arc::new(star(24)),
        Arc::new(ArpTable::new()),
    )
    .unwrap()
}

fn frame(seq: u32, sender: char) -> Bytes {
    FloodFrame::new(
        EtherHeader {
            dst: MacAddress::BROADCAST,
            src: make_id(sender).mac(),
            ethertype: ETHERTYPE,
        },
        FloodHeader {
            sequence: seq,
            originator: make_id('Y'),
            sender: make_id(sender),
        },
        Bytes::from(vec![0u8; 100]),
    )
    .encode()
    .unwrap()
}

// ============================================================================
// Coverage Estimation Benchmarks
// ============================================================================

fn bench_probabilities(c: &mut Criterion) {
    let mut group = c.benchmark_group("probabilities");
    let oracle = star(24);

    group.bench_function("update_probs_24_neighbors", |b| {
        let mut table = SequenceProbabilityTable::new();
        let mut seq = 0u32;
        b.iter(|| {
            seq = seq.wrapping_add(1);
            table.update_probs(black_box(seq), &make_id('A'), &oracle, true);
            table.trim(100);
        })
    });

    let engine = ForwardDecisionEngine::new(&config(FloodSettings::default()));
    let mut table = SequenceProbabilityTable::new();
    table.update_probs(1, &make_id('B'), &oracle, true);

    group.bench_function("expected_rx_24_neighbors", |b| {
        b.iter(|| engine.expected_rx(&table, &oracle, black_box(1), &make_id('A')))
    });

    group.finish();
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");

    let mut plain = ForwardDecisionEngine::new(&config(FloodSettings::default()));
    group.bench_function("plan_uniform", |b| {
        b.iter(|| plain.plan(false, black_box(4.0), black_box(1.5)))
    });

    let mut slotted = ForwardDecisionEngine::new(&config(FloodSettings::slotted()));
    group.bench_function("plan_slotted", |b| {
        b.iter(|| slotted.plan(false, black_box(4.0), black_box(1.5)))
    });

    group.finish();
}

// ============================================================================
// Controller Benchmarks
// ============================================================================

fn bench_ingress(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingress");

    group.bench_function("new_frame_history_100", |b| {
        let mut node = node();
        let mut out: Vec<FloodOutput> = Vec::new();
        let now = Instant::now();
        let mut seq = 0u32;
        b.iter(|| {
            seq = seq.wrapping_add(1);
            out.clear();
            node.handle_link_frame(black_box(&frame(seq, 'B')), now, &mut out)
        })
    });

    group.bench_function("duplicate_frame", |b| {
        let mut node = node();
        let mut out: Vec<FloodOutput> = Vec::new();
        let now = Instant::now();
        node.handle_link_frame(&frame(1, 'B'), now, &mut out);
        let duplicate = frame(1, 'C');
        b.iter(|| node.handle_link_frame(black_box(&duplicate), now, &mut out))
    });

    group.bench_function("fire_100_timers", |b| {
        let mut node = node();
        let mut out: Vec<FloodOutput> = Vec::new();
        let mut seq = 0u32;
        b.iter(|| {
            let now = Instant::now();
            for _ in 0..100 {
                seq = seq.wrapping_add(1);
                node.handle_link_frame(&frame(seq, 'B'), now, &mut out);
            }
            out.clear();
            node.poll_timers(now + Duration::from_secs(1), &mut out)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_probabilities, bench_planning, bench_ingress);

criterion_main!(benches);
