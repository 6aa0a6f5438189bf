//! Flood Suppression Scenario Tests
//!
//! End-to-end behavior of a single flood controller driven through its
//! public interface:
//! - Suppression thresholds (COUNT = 0, 1, N)
//! - Duplicate counting and idempotence
//! - Bounded history and both eviction policies
//! - Early suppression, slotting and address resolution
//!
//! Time is passed explicitly, so no test sleeps.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use ripple_core::{
    ArpTable, EtherHeader, FloodFrame, FloodHeader, LinkTable, MacAddress, SimulationIdentity,
};
use ripple_flood::{
    BroadcastState, EvictionPolicy, FloodConfig, FloodController, FloodOutput, FloodSettings,
    LinkIngress,
};

const ETHERTYPE: u16 = 0x0941;

type Node =
    FloodController<SimulationIdentity, LinkTable<SimulationIdentity>, ArpTable<SimulationIdentity>>;

// ============================================================================
// Helpers
// ============================================================================

fn make_id(c: char) -> SimulationIdentity {
    SimulationIdentity::new(c).unwrap()
}

/// 'S' with neighbors A, B, C and D
fn links() -> LinkTable<SimulationIdentity> {
    let table = LinkTable::new();
    table.set_symmetric(make_id('S'), make_id('A'), 0.9);
    table.set_symmetric(make_id('S'), make_id('B'), 0.8);
    table.set_symmetric(make_id('S'), make_id('C'), 0.6);
    table.set_symmetric(make_id('S'), make_id('D'), 0.4);
    table.set_symmetric(make_id('A'), make_id('B'), 0.7);
    table
}

fn settings() -> FloodSettings {
    FloodSettings {
        rng_seed: Some(0xF100D),
        first_sequence: Some(1),
        ..FloodSettings::default()
    }
}

fn node_with(count: u32, settings: FloodSettings) -> Node {
    node_with_arp(count, settings, ArpTable::new())
}

fn node_with_arp(count: u32, settings: FloodSettings, arp: ArpTable<SimulationIdentity>) -> Node {
    ripple_logging::init_testing();
    let config = FloodConfig::builder()
        .ethertype(ETHERTYPE)
        .ip(make_id('S'))
        .bcast_ip(make_id('Z'))
        .eth(make_id('S').mac())
        .count(count)
        .settings(settings)
        .build()
        .unwrap();
    FloodController::new(config, Arc::new(links()), Arc::new(arp)).unwrap()
}

fn node(count: u32) -> Node {
    node_with(count, settings())
}

fn frame(seq: u32, origin: char, sender: char) -> Bytes {
    FloodFrame::new(
        EtherHeader {
            dst: MacAddress::BROADCAST,
            src: make_id(sender).mac(),
            ethertype: ETHERTYPE,
        },
        FloodHeader {
            sequence: seq,
            originator: make_id(origin),
            sender: make_id(sender),
        },
        Bytes::from(format!("packet {}", seq)),
    )
    .encode()
    .unwrap()
}

fn transmitted(out: &[FloodOutput]) -> Vec<FloodFrame<SimulationIdentity>> {
    out.iter()
        .filter_map(|o| match o {
            FloodOutput::Transmit(bytes) => Some(FloodFrame::decode(bytes, ETHERTYPE).unwrap()),
            FloodOutput::Deliver(_) => None,
        })
        .collect()
}

fn delivered(out: &[FloodOutput]) -> usize {
    out.iter()
        .filter(|o| matches!(o, FloodOutput::Deliver(_)))
        .count()
}

fn later(now: Instant) -> Instant {
    now + Duration::from_secs(10)
}

// ============================================================================
// Threshold Semantics
// ============================================================================

#[test]
fn test_count_zero_always_forwards() {
    let mut node = node(0);
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    node.handle_link_frame(&frame(5, 'Y', 'A'), now, &mut out);
    for sender in ['B', 'C', 'D'] {
        node.handle_link_frame(&frame(5, 'Y', sender), now, &mut out);
    }
    assert_eq!(node.registry().find(5).unwrap().rx_count, 4);

    node.poll_timers(later(now), &mut out);
    let sent = transmitted(&out);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].header.sequence, 5);
    assert!(matches!(
        node.registry().find(5).unwrap().state,
        BroadcastState::Sent
    ));
}

#[test]
fn test_count_one_never_relays() {
    let mut node = node(1);
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    for seq in 10..15 {
        node.handle_link_frame(&frame(seq, 'Y', 'A'), now, &mut out);
    }
    let own = node
        .originate(Bytes::from_static(b"mine"), now, &mut out)
        .unwrap();

    node.poll_timers(later(now), &mut out);
    let sent = transmitted(&out);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].header.sequence, own);
    assert_eq!(sent[0].header.originator, make_id('S'));
    assert_eq!(delivered(&out), 5);
    assert_eq!(node.stats().suppressed, 5);
}

#[test]
fn test_originate_then_overhear_suppresses() {
    // COUNT=2, HISTORY=3
    let mut node = node_with(
        2,
        FloodSettings {
            history: 3,
            origin_jitter_ms: 50,
            ..settings()
        },
    );
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    let seq = node
        .originate(Bytes::from_static(b"hello"), now, &mut out)
        .unwrap();
    assert_eq!(seq, 1);
    {
        let record = node.registry().find(1).unwrap();
        assert!(record.originated);
        assert!(record.is_scheduled());
        assert!(record.delay <= Duration::from_millis(750));
        assert_eq!(record.rx_count, 0);
    }

    // Both relays beat the origin jitter
    node.handle_link_frame(&frame(1, 'S', 'A'), now, &mut out);
    node.handle_link_frame(&frame(1, 'S', 'B'), now, &mut out);
    {
        let record = node.registry().find(1).unwrap();
        assert_eq!(record.rx_count, 2);
        assert_eq!(record.extra_receivers, vec![make_id('A'), make_id('B')]);
    }

    node.poll_timers(later(now), &mut out);
    let record = node.registry().find(1).unwrap();
    assert!(matches!(record.state, BroadcastState::Suppressed));
    assert!(record.is_sent());
    assert_eq!(record.tx_count, 0);
    assert!(transmitted(&out).is_empty());
    assert_eq!(delivered(&out), 0);
}

#[test]
fn test_single_reception_is_forwarded() {
    let mut node = node(2);
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    assert_eq!(
        node.handle_link_frame(&frame(7, 'C', 'C'), now, &mut out),
        LinkIngress::New { sequence: 7 }
    );
    {
        let record = node.registry().find(7).unwrap();
        assert_eq!(record.rx_count, 1);
        assert!(record.is_scheduled());
        assert_eq!(record.received_from, Some(make_id('C')));
        let send_at = record.send_at.unwrap();
        assert!(send_at >= now && send_at <= now + Duration::from_millis(750));
    }

    let fired = node.poll_timers(later(now), &mut out);
    assert_eq!(fired, 1);

    let record = node.registry().find(7).unwrap();
    assert_eq!(record.tx_count, 1);
    assert!(record.is_sent());
    assert!(matches!(record.state, BroadcastState::Sent));
    assert_eq!(transmitted(&out).len(), 1);
    assert_eq!(node.stats().forwarded, 1);
}

#[test]
fn test_timer_uses_latest_count() {
    let mut node = node(3);
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    node.handle_link_frame(&frame(8, 'Y', 'A'), now, &mut out);
    let fire_at = node.next_deadline().unwrap();

    // Nothing due yet
    assert_eq!(node.poll_timers(now, &mut out), 0);

    node.handle_link_frame(&frame(8, 'Y', 'B'), now, &mut out);
    node.handle_link_frame(&frame(8, 'Y', 'C'), now, &mut out);

    // Without early suppression the record stays scheduled until its timer
    assert!(node.registry().find(8).unwrap().is_scheduled());
    assert_eq!(node.poll_timers(fire_at, &mut out), 1);
    assert!(matches!(
        node.registry().find(8).unwrap().state,
        BroadcastState::Suppressed
    ));
    assert!(transmitted(&out).is_empty());
}

// ============================================================================
// Duplicate Counting
// ============================================================================

#[test]
fn test_duplicate_reception_is_idempotent() {
    let mut node = node(5);
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    node.handle_link_frame(&frame(3, 'Y', 'A'), now, &mut out);
    let p_c = node.probabilities().get_prob(3, &make_id('C'));

    assert_eq!(
        node.handle_link_frame(&frame(3, 'Y', 'B'), now, &mut out),
        LinkIngress::Duplicate {
            sequence: 3,
            counted: true
        }
    );
    let after_b = node.probabilities().get_prob(3, &make_id('A'));
    for _ in 0..3 {
        assert_eq!(
            node.handle_link_frame(&frame(3, 'Y', 'B'), now, &mut out),
            LinkIngress::Duplicate {
                sequence: 3,
                counted: false
            }
        );
        // The first sender again
        node.handle_link_frame(&frame(3, 'Y', 'A'), now, &mut out);
    }

    let record = node.registry().find(3).unwrap();
    assert_eq!(record.rx_count, 2);
    assert_eq!(record.extra_receivers, vec![make_id('B')]);
    assert_eq!(node.probabilities().get_prob(3, &make_id('A')), after_b);
    assert_eq!(node.probabilities().get_prob(3, &make_id('C')), p_c);
    assert_eq!(delivered(&out), 1);
    assert_eq!(node.stats().duplicates, 7);
}

#[test]
fn test_overheard_copies_raise_probabilities() {
    let mut node = node(5);
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    node.handle_link_frame(&frame(4, 'Y', 'A'), now, &mut out);
    let erx_first = node.registry().find(4).unwrap().expected_rx;

    // A heard directly; S and B inferred through A's links
    let table = node.probabilities();
    assert_eq!(table.get_prob(4, &make_id('A')), Some(1.0));
    assert!((table.get_prob(4, &make_id('S')).unwrap() - 0.9).abs() < 1e-9);
    assert!((table.get_prob(4, &make_id('B')).unwrap() - 0.7).abs() < 1e-9);
    assert_eq!(table.get_prob(4, &make_id('D')), None);

    // Uncovered: B (0.8 * 0.3), C (0.6), D (0.4)
    assert!((erx_first - (0.8 * 0.3 + 0.6 + 0.4)).abs() < 1e-9);
}

// ============================================================================
// History and Eviction
// ============================================================================

#[test]
fn test_registry_never_exceeds_history() {
    let mut node = node_with(
        2,
        FloodSettings {
            history: 3,
            ..settings()
        },
    );
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    for seq in 100..110 {
        node.handle_link_frame(&frame(seq, 'Y', 'A'), now, &mut out);
        assert!(node.registry().len() <= 3);
        assert!(node.probabilities().len() <= 3);
    }

    let kept: Vec<u32> = node.registry().iter().map(|r| r.sequence).collect();
    assert_eq!(kept, vec![107, 108, 109]);
    assert_eq!(node.stats().evicted, 7);
}

#[test]
fn test_eviction_drop_cancels_pending_forward() {
    let mut node = node_with(
        2,
        FloodSettings {
            history: 3,
            eviction: EvictionPolicy::Drop,
            ..settings()
        },
    );
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    for seq in 1..=4 {
        node.handle_link_frame(&frame(seq, 'Y', 'A'), now, &mut out);
    }
    assert!(node.registry().find(1).is_none());
    assert!(transmitted(&out).is_empty());

    node.poll_timers(later(now), &mut out);
    let mut sent: Vec<u32> = transmitted(&out).iter().map(|f| f.header.sequence).collect();
    sent.sort();
    assert_eq!(sent, vec![2, 3, 4]);

    let stats = node.stats();
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.evicted_pending, 1);
    assert_eq!(stats.pending, 0);
}

#[test]
fn test_eviction_force_forward_sends_at_eviction() {
    let mut node = node_with(
        2,
        FloodSettings {
            history: 3,
            eviction: EvictionPolicy::ForceForward,
            ..settings()
        },
    );
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    for seq in 1..=3 {
        node.handle_link_frame(&frame(seq, 'Y', 'A'), now, &mut out);
    }
    assert!(transmitted(&out).is_empty());

    node.handle_link_frame(&frame(4, 'Y', 'A'), now, &mut out);
    let sent = transmitted(&out);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].header.sequence, 1);
    assert_eq!(sent[0].header.sender, make_id('S'));

    // The evicted timer never fires a second copy
    out.clear();
    node.poll_timers(later(now), &mut out);
    let mut sent: Vec<u32> = transmitted(&out).iter().map(|f| f.header.sequence).collect();
    sent.sort();
    assert_eq!(sent, vec![2, 3, 4]);
    assert_eq!(node.stats().forwarded, 4);
}

#[test]
fn test_force_forward_still_honors_threshold() {
    let mut node = node_with(
        2,
        FloodSettings {
            history: 1,
            eviction: EvictionPolicy::ForceForward,
            ..settings()
        },
    );
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    node.handle_link_frame(&frame(1, 'Y', 'A'), now, &mut out);
    node.handle_link_frame(&frame(1, 'Y', 'B'), now, &mut out);
    node.handle_link_frame(&frame(2, 'Y', 'A'), now, &mut out);

    assert!(transmitted(&out).is_empty());
    assert_eq!(node.stats().suppressed, 1);
}

#[test]
fn test_decided_records_evict_quietly() {
    let mut node = node_with(
        2,
        FloodSettings {
            history: 2,
            eviction: EvictionPolicy::ForceForward,
            ..settings()
        },
    );
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    node.handle_link_frame(&frame(1, 'Y', 'A'), now, &mut out);
    node.poll_timers(later(now), &mut out);
    out.clear();

    node.handle_link_frame(&frame(2, 'Y', 'A'), later(now), &mut out);
    node.handle_link_frame(&frame(3, 'Y', 'A'), later(now), &mut out);

    assert!(transmitted(&out).is_empty());
    let stats = node.stats();
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.evicted_pending, 0);
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn test_delay_within_max_delay() {
    for settings in [
        settings(),
        FloodSettings {
            pick_slots: true,
            slot_time_ms: 40,
            ..settings()
        },
        FloodSettings {
            max_delay_ms: 120,
            slot_time_ms: 7,
            ..FloodSettings::slotted()
        },
    ] {
        let max = settings.max_delay();
        let mut node = node_with(2, FloodSettings { history: 500, ..settings });
        let now = Instant::now();
        let mut out: Vec<FloodOutput> = Vec::new();

        for seq in 0..300 {
            let sender = ['A', 'B', 'C', 'D'][seq as usize % 4];
            node.handle_link_frame(&frame(seq, 'Y', sender), now, &mut out);
        }
        for record in node.registry().iter() {
            assert!(record.delay <= max);
            assert!(record.send_at.unwrap() <= now + max);
        }
    }
}

#[test]
fn test_slotted_records_carry_slot() {
    let mut node = node_with(
        2,
        FloodSettings {
            max_delay_ms: 100,
            slot_time_ms: 10,
            rng_seed: Some(3),
            first_sequence: Some(1),
            ..FloodSettings::slotted()
        },
    );
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    node.handle_link_frame(&frame(1, 'Y', 'A'), now, &mut out);
    let record = node.registry().find(1).unwrap();
    let slot = record.slot.unwrap();

    // S has four neighbors; score = erx + weight >= 4, so slot <= 5
    assert!(record.neighbor_weight >= 4.0);
    assert!(slot <= 5);
    assert!(record.delay >= Duration::from_millis(10 * slot as u64));
    assert!(record.delay < Duration::from_millis(10 * (slot as u64 + 1)));
}

#[test]
fn test_early_suppression_cancels_timer() {
    let mut node = node_with(
        2,
        FloodSettings {
            early_suppress: true,
            ..settings()
        },
    );
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    node.handle_link_frame(&frame(9, 'Y', 'A'), now, &mut out);
    assert!(node.next_deadline().is_some());

    node.handle_link_frame(&frame(9, 'Y', 'B'), now, &mut out);
    let record = node.registry().find(9).unwrap();
    assert!(matches!(record.state, BroadcastState::Suppressed));
    assert_eq!(node.next_deadline(), None);

    // Further copies change counts but never the decision
    node.handle_link_frame(&frame(9, 'Y', 'C'), now, &mut out);
    assert_eq!(node.poll_timers(later(now), &mut out), 0);
    assert_eq!(node.registry().find(9).unwrap().rx_count, 3);
    assert_eq!(node.stats().suppressed, 1);
    assert!(transmitted(&out).is_empty());
}

// ============================================================================
// Addressing
// ============================================================================

#[test]
fn test_broadcast_destination_resolution() {
    let group = MacAddress([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]);
    let mut node = node_with_arp(0, settings(), ArpTable::with_binding(make_id('Z'), group));
    let now = Instant::now();
    let mut out: Vec<FloodOutput> = Vec::new();

    node.originate(Bytes::from_static(b"x"), now, &mut out)
        .unwrap();
    node.poll_timers(now, &mut out);

    let sent = transmitted(&out);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ether.dst, group);
    assert_eq!(sent[0].ether.src, make_id('S').mac());
    assert_eq!(sent[0].payload, Bytes::from_static(b"x"));
}

#[test]
fn test_foreign_ethertype_is_ignored() {
    let mut node = node(2);
    let mut out: Vec<FloodOutput> = Vec::new();
    let mut bytes = frame(1, 'Y', 'A').to_vec();
    bytes[12] = 0x08;
    bytes[13] = 0x00;

    assert!(matches!(
        node.handle_link_frame(&bytes, Instant::now(), &mut out),
        LinkIngress::Dropped(_)
    ));
    assert!(out.is_empty());
    assert!(node.registry().is_empty());
}
