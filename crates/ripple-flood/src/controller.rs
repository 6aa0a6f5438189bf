//! The flood state machine for one node
//!
//! [`FloodController`] owns the registry, the probability table, the
//! scheduler and the decision engine. It is driven by three kinds of events,
//! each handled to completion before the next:
//!
//! - a frame from the link layer ([`FloodController::handle_link_frame`])
//! - a packet from the local stack ([`FloodController::originate`])
//! - timer expiry ([`FloodController::poll_timers`])
//!
//! Outputs go to a [`FloodSink`]. Time is always passed in, so the same
//! controller runs under a real clock or a simulated one.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use ripple_core::{
    AddressResolver, EtherHeader, FloodFrame, FloodHeader, FrameError, LinkQualityOracle,
    MAX_PAYLOAD_LEN, PeerIdentity,
};

use crate::config::{EvictionPolicy, FloodConfig, validate_min_p};
use crate::decision::{FloodDecision, ForwardDecisionEngine};
use crate::error::{ConfigError, FloodResult, ScheduleError};
use crate::probability::SequenceProbabilityTable;
use crate::registry::{BroadcastRecord, BroadcastRegistry, BroadcastState, EvictedBroadcast};
use crate::scheduler::{Scheduler, TimerFired};

// Per-packet events are promoted to info when the node's debug flag is on.
macro_rules! packet_event {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            info!($($arg)+)
        } else {
            debug!($($arg)+)
        }
    };
}

/// Receiver of controller output
pub trait FloodSink {
    /// Hand an encoded frame to the link layer
    fn transmit(&mut self, frame: Bytes);

    /// Hand a payload to the local stack
    fn deliver(&mut self, payload: Bytes);
}

/// One controller output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloodOutput {
    /// Encoded frame for the link layer
    Transmit(Bytes),
    /// Payload for the local stack
    Deliver(Bytes),
}

impl FloodSink for Vec<FloodOutput> {
    fn transmit(&mut self, frame: Bytes) {
        self.push(FloodOutput::Transmit(frame));
    }

    fn deliver(&mut self, payload: Bytes) {
        self.push(FloodOutput::Deliver(payload));
    }
}

/// What happened to an incoming link frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkIngress {
    /// First copy of a sequence; delivered upward and scheduled
    New { sequence: u32 },
    /// Another copy of a known sequence
    Duplicate {
        sequence: u32,
        /// The copy came from a sender not heard before
        counted: bool,
    },
    /// Not processed
    Dropped(DropReason),
}

/// Why an incoming frame was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Undecodable, truncated or foreign ethertype
    Malformed,
    /// Our own transmission heard back
    SelfEcho,
    /// Our own broadcast relayed back after it left history
    OwnBroadcast,
    /// The forwarding timer could not be armed
    Unschedulable,
}

/// Counters since creation or the last [`FloodController::clear`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloodStats {
    /// Broadcasts started locally
    pub originated: u64,
    /// Transmissions made (originated and relayed)
    pub forwarded: u64,
    /// New broadcasts received from the link
    pub received: u64,
    /// Copies of already known broadcasts
    pub duplicates: u64,
    /// Frames reusing a retained sequence under a different originator
    pub sequence_conflicts: u64,
    /// Broadcasts decided against forwarding
    pub suppressed: u64,
    /// Records removed by history trimming
    pub evicted: u64,
    /// Evicted records whose timer had not fired
    pub evicted_pending: u64,
    /// Frames dropped at ingress
    pub dropped: u64,
    /// Broadcasts discarded because their timer could not be armed
    pub unschedulable: u64,
    /// Records currently awaiting their timer
    pub pending: usize,
    /// Records currently retained
    pub retained: usize,
    /// When counting started: creation or the last clear
    pub since: DateTime<Utc>,
}

impl fmt::Display for FloodStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "since {}", self.since.format("%Y-%m-%d %H:%M:%S%.3f"))?;
        writeln!(f, "originated {}", self.originated)?;
        writeln!(f, "received {}", self.received)?;
        writeln!(f, "duplicates {}", self.duplicates)?;
        writeln!(f, "sequence conflicts {}", self.sequence_conflicts)?;
        writeln!(f, "forwarded {}", self.forwarded)?;
        writeln!(f, "suppressed {}", self.suppressed)?;
        writeln!(f, "evicted {} ({} pending)", self.evicted, self.evicted_pending)?;
        writeln!(f, "dropped {}", self.dropped)?;
        writeln!(f, "unschedulable {}", self.unschedulable)?;
        write!(f, "retained {} ({} pending)", self.retained, self.pending)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    originated: u64,
    forwarded: u64,
    received: u64,
    duplicates: u64,
    sequence_conflicts: u64,
    suppressed: u64,
    evicted: u64,
    evicted_pending: u64,
    dropped: u64,
    unschedulable: u64,
}

/// Snapshot of one retained broadcast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastSummary<I: PeerIdentity> {
    pub sequence: u32,
    pub originated: bool,
    pub originator: I,
    pub state: &'static str,
    pub rx_count: u32,
    pub tx_count: u32,
    pub delay_ms: u64,
    pub slot: Option<u32>,
    pub neighbor_weight: f64,
    pub expected_rx: f64,
    pub received_from: Option<I>,
    pub extra_receivers: Vec<I>,
    pub payload_len: usize,
}

impl<I: PeerIdentity> From<&BroadcastRecord<I>> for BroadcastSummary<I> {
    fn from(record: &BroadcastRecord<I>) -> Self {
        Self {
            sequence: record.sequence,
            originated: record.originated,
            originator: record.originator.clone(),
            state: record.state.name(),
            rx_count: record.rx_count,
            tx_count: record.tx_count,
            delay_ms: record.delay.as_millis().min(u64::MAX as u128) as u64,
            slot: record.slot,
            neighbor_weight: record.neighbor_weight,
            expected_rx: record.expected_rx,
            received_from: record.received_from.clone(),
            extra_receivers: record.extra_receivers.clone(),
            payload_len: record.payload.len(),
        }
    }
}

impl<I: PeerIdentity> fmt::Display for BroadcastSummary<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seq {} origin {} {} rx {} tx {} delay {}ms",
            self.sequence,
            self.originator.short_id(),
            self.state,
            self.rx_count,
            self.tx_count,
            self.delay_ms
        )?;
        if let Some(slot) = self.slot {
            write!(f, " slot {}", slot)?;
        }
        write!(
            f,
            " erx {:.3} nweight {:.3}",
            self.expected_rx, self.neighbor_weight
        )?;
        match &self.received_from {
            Some(from) => write!(f, " from {}", from.short_id())?,
            None => write!(f, " local")?,
        }
        if !self.extra_receivers.is_empty() {
            let extra: Vec<String> = self.extra_receivers.iter().map(|r| r.short_id()).collect();
            write!(f, " heard [{}]", extra.join(","))?;
        }
        Ok(())
    }
}

/// Probabilistic flood suppression for one node
pub struct FloodController<I, O, R>
where
    I: PeerIdentity,
    O: LinkQualityOracle<I> + ?Sized,
    R: AddressResolver<I> + ?Sized,
{
    config: FloodConfig<I>,
    oracle: Arc<O>,
    resolver: Arc<R>,
    registry: BroadcastRegistry<I>,
    probabilities: SequenceProbabilityTable<I>,
    scheduler: Scheduler,
    engine: ForwardDecisionEngine,
    next_sequence: u32,
    counters: Counters,
    since: DateTime<Utc>,
}

impl<I, O, R> FloodController<I, O, R>
where
    I: PeerIdentity,
    O: LinkQualityOracle<I> + ?Sized,
    R: AddressResolver<I> + ?Sized,
{
    /// Create a controller, rejecting invalid configurations
    pub fn new(config: FloodConfig<I>, oracle: Arc<O>, resolver: Arc<R>) -> FloodResult<Self> {
        config.validate()?;
        for warning in config.warnings() {
            warn!(node = %config.ip.short_id(), "{}", warning);
        }

        let mut engine = ForwardDecisionEngine::new(&config);
        let next_sequence = match config.settings.first_sequence {
            Some(first) => first,
            None => engine.random_sequence(),
        };

        debug!(
            node = %config.ip.short_id(),
            count = config.count,
            max_delay_ms = config.settings.max_delay_ms,
            history = config.settings.history,
            "Flood controller created"
        );

        Ok(Self {
            config,
            oracle,
            resolver,
            registry: BroadcastRegistry::new(),
            probabilities: SequenceProbabilityTable::new(),
            scheduler: Scheduler::new(),
            engine,
            next_sequence,
            counters: Counters::default(),
            since: Utc::now(),
        })
    }

    pub fn config(&self) -> &FloodConfig<I> {
        &self.config
    }

    /// This node's address
    pub fn local_address(&self) -> &I {
        &self.config.ip
    }

    pub fn registry(&self) -> &BroadcastRegistry<I> {
        &self.registry
    }

    pub fn probabilities(&self) -> &SequenceProbabilityTable<I> {
        &self.probabilities
    }

    /// Sequence number the next originated packet will try first
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Process a frame received from the link layer
    pub fn handle_link_frame<S: FloodSink + ?Sized>(
        &mut self,
        frame: &[u8],
        now: Instant,
        sink: &mut S,
    ) -> LinkIngress {
        let frame = match FloodFrame::<I>::decode(frame, self.config.ethertype) {
            Ok(frame) => frame,
            Err(e) => {
                self.counters.dropped += 1;
                trace!(node = %self.config.ip.short_id(), error = %e, "Dropping undecodable frame");
                return LinkIngress::Dropped(DropReason::Malformed);
            }
        };

        let FloodFrame {
            ether,
            header,
            payload,
        } = frame;
        let FloodHeader {
            sequence,
            originator,
            sender,
        } = header;

        if sender == self.config.ip {
            self.counters.dropped += 1;
            trace!(seq = sequence, "Ignoring echo of own transmission");
            return LinkIngress::Dropped(DropReason::SelfEcho);
        }
        self.resolver.learn(&sender, ether.src);

        if let Some(record) = self.registry.find(sequence) {
            let conflict = record.originator != originator;
            if conflict {
                trace!(
                    seq = sequence,
                    originator = %originator.short_id(),
                    retained_originator = %record.originator.short_id(),
                    "Sequence reused by another originator"
                );
            }
            return self.handle_duplicate(sequence, sender, conflict);
        }

        if originator == self.config.ip {
            self.counters.dropped += 1;
            trace!(seq = sequence, sender = %sender.short_id(), "Own broadcast returned after eviction");
            return LinkIngress::Dropped(DropReason::OwnBroadcast);
        }

        self.counters.received += 1;
        sink.deliver(payload.clone());

        self.probabilities.update_probs(
            sequence,
            &sender,
            &*self.oracle,
            self.config.settings.lossy,
        );

        let record = BroadcastRecord::received(sequence, originator, sender.clone(), payload, now);
        match self.schedule(record, now) {
            Ok(()) => {
                if let Some(record) = self.registry.find(sequence) {
                    packet_event!(
                        self.config.settings.debug,
                        node = %self.config.ip.short_id(),
                        seq = sequence,
                        sender = %sender.short_id(),
                        delay_ms = record.delay.as_millis() as u64,
                        slot = ?record.slot,
                        expected_rx = record.expected_rx,
                        "New broadcast scheduled"
                    );
                }
            }
            Err(e) => {
                warn!(node = %self.config.ip.short_id(), seq = sequence, error = %e, "Discarding broadcast");
                return LinkIngress::Dropped(DropReason::Unschedulable);
            }
        }

        self.trim(sink);
        LinkIngress::New { sequence }
    }

    // Frames are matched by sequence alone, so a conflicting originator still
    // counts as a reception of the retained broadcast.
    fn handle_duplicate(&mut self, sequence: u32, sender: I, conflict: bool) -> LinkIngress {
        if conflict {
            self.counters.sequence_conflicts += 1;
        } else {
            self.counters.duplicates += 1;
        }

        let Some(record) = self.registry.find_mut(sequence) else {
            return LinkIngress::Dropped(DropReason::Malformed);
        };

        let counted = record.note_reception(&sender);
        if counted {
            self.probabilities.update_probs(
                sequence,
                &sender,
                &*self.oracle,
                self.config.settings.lossy,
            );

            if self.config.settings.early_suppress && record.is_scheduled() {
                if let FloodDecision::Suppress { .. } = self.engine.decide(record.rx_count) {
                    record.state = BroadcastState::Suppressed;
                    self.counters.suppressed += 1;
                    packet_event!(
                        self.config.settings.debug,
                        node = %self.config.ip.short_id(),
                        seq = sequence,
                        rx_count = record.rx_count,
                        "Pending forward cancelled early"
                    );
                }
            }
        }

        trace!(
            seq = sequence,
            sender = %sender.short_id(),
            rx_count = record.rx_count,
            counted,
            "Duplicate reception"
        );
        LinkIngress::Duplicate { sequence, counted }
    }

    /// Start a new broadcast from the local stack
    ///
    /// Returns the sequence number assigned to it.
    pub fn originate<S: FloodSink + ?Sized>(
        &mut self,
        payload: Bytes,
        now: Instant,
        sink: &mut S,
    ) -> FloodResult<u32> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_LEN,
            }
            .into());
        }

        let sequence = self.claim_sequence();
        self.probabilities.set_prob(sequence, &self.config.ip, 1.0);

        let record = BroadcastRecord::originated(sequence, self.config.ip.clone(), payload);
        self.schedule(record, now)?;
        self.counters.originated += 1;

        packet_event!(
            self.config.settings.debug,
            node = %self.config.ip.short_id(),
            seq = sequence,
            "Originated broadcast"
        );

        self.trim(sink);
        Ok(sequence)
    }

    // Sequences are shared with other originators, so skip any still retained.
    fn claim_sequence(&mut self) -> u32 {
        let mut sequence = self.next_sequence;
        while self.registry.find(sequence).is_some() {
            sequence = sequence.wrapping_add(1);
        }
        self.next_sequence = sequence.wrapping_add(1);
        sequence
    }

    fn schedule(&mut self, mut record: BroadcastRecord<I>, now: Instant) -> FloodResult<()> {
        if record.is_sent() {
            return Err(ScheduleError::AlreadyFired {
                sequence: record.sequence,
            }
            .into());
        }

        let local = &self.config.ip;
        let neighbor_weight = self.engine.neighbor_weight(&*self.oracle, local);
        let expected_rx =
            self.engine
                .expected_rx(&self.probabilities, &*self.oracle, record.sequence, local);
        let plan = self
            .engine
            .plan(record.originated, neighbor_weight, expected_rx);

        let handle = match self.scheduler.arm(record.sequence, now, plan.delay) {
            Ok(handle) => handle,
            Err(e) => {
                self.counters.unschedulable += 1;
                return Err(e.into());
            }
        };

        record.delay = plan.delay;
        record.slot = plan.slot;
        record.neighbor_weight = plan.neighbor_weight;
        record.expected_rx = plan.expected_rx;
        record.send_at = Some(handle.fire_at());
        record.state = BroadcastState::Scheduled(handle);

        self.registry.insert(record)
    }

    /// Fire every timer due at `now`, returning how many were handled
    pub fn poll_timers<S: FloodSink + ?Sized>(&mut self, now: Instant, sink: &mut S) -> usize {
        let mut fired = 0;
        while let Some(timer) = self.scheduler.pop_expired(now) {
            if self.fire(timer, sink) {
                fired += 1;
            }
        }
        fired
    }

    fn fire<S: FloodSink + ?Sized>(&mut self, timer: TimerFired, sink: &mut S) -> bool {
        let Some(record) = self.registry.find_mut(timer.sequence) else {
            trace!(seq = timer.sequence, "Timer fired for unknown broadcast");
            return false;
        };
        if record.timer_token() != Some(timer.token) {
            trace!(seq = timer.sequence, "Stale timer ignored");
            return false;
        }

        match self.engine.decide(record.rx_count) {
            FloodDecision::Forward => {
                record.state = BroadcastState::Sent;
                let sent = transmit(&self.config, &*self.resolver, record, sink);
                if sent {
                    self.counters.forwarded += 1;
                    self.probabilities.update_probs(
                        timer.sequence,
                        &self.config.ip,
                        &*self.oracle,
                        self.config.settings.lossy,
                    );
                    packet_event!(
                        self.config.settings.debug,
                        node = %self.config.ip.short_id(),
                        seq = timer.sequence,
                        rx_count = record.rx_count,
                        originated = record.originated,
                        "Forwarded broadcast"
                    );
                }
            }
            FloodDecision::Suppress { reason } => {
                record.state = BroadcastState::Suppressed;
                self.counters.suppressed += 1;
                packet_event!(
                    self.config.settings.debug,
                    node = %self.config.ip.short_id(),
                    seq = timer.sequence,
                    rx_count = record.rx_count,
                    reason = ?reason,
                    "Suppressed broadcast"
                );
            }
        }
        true
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    fn trim<S: FloodSink + ?Sized>(&mut self, sink: &mut S) {
        let history = self.config.settings.history;
        for evicted in self.registry.trim(history) {
            self.evict(evicted, sink);
        }
        self.probabilities.trim(history);
    }

    fn evict<S: FloodSink + ?Sized>(&mut self, evicted: EvictedBroadcast<I>, sink: &mut S) {
        let EvictedBroadcast {
            mut record,
            was_pending,
        } = evicted;
        self.counters.evicted += 1;

        if !was_pending {
            trace!(seq = record.sequence, state = record.state.name(), "Evicted broadcast");
            return;
        }
        self.counters.evicted_pending += 1;

        match self.config.settings.eviction {
            EvictionPolicy::Drop => {
                packet_event!(
                    self.config.settings.debug,
                    node = %self.config.ip.short_id(),
                    seq = record.sequence,
                    "Pending broadcast dropped from history"
                );
            }
            EvictionPolicy::ForceForward => match self.engine.decide(record.rx_count) {
                FloodDecision::Forward => {
                    record.state = BroadcastState::Sent;
                    if transmit(&self.config, &*self.resolver, &mut record, sink) {
                        self.counters.forwarded += 1;
                        packet_event!(
                            self.config.settings.debug,
                            node = %self.config.ip.short_id(),
                            seq = record.sequence,
                            "Forwarded broadcast at eviction"
                        );
                    }
                }
                FloodDecision::Suppress { .. } => {
                    self.counters.suppressed += 1;
                }
            },
        }
    }

    /// Whether per-packet events are logged at info level
    pub fn debug(&self) -> bool {
        self.config.settings.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.config.settings.debug = debug;
    }

    /// Coverage threshold used by expected-receiver estimates
    pub fn min_p(&self) -> f64 {
        self.engine.min_p()
    }

    pub fn set_min_p(&mut self, min_p: f64) -> Result<(), ConfigError> {
        validate_min_p(min_p)?;
        self.engine.set_min_p(min_p);
        self.config.settings.min_p = min_p;
        Ok(())
    }

    /// Forget every broadcast, probability and counter
    ///
    /// Pending forwards are cancelled. Sequence numbering continues.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.probabilities.clear();
        self.scheduler.clear();
        self.counters = Counters::default();
        self.since = Utc::now();
        info!(node = %self.config.ip.short_id(), "Flood state cleared");
    }

    pub fn stats(&self) -> FloodStats {
        let c = self.counters;
        FloodStats {
            originated: c.originated,
            forwarded: c.forwarded,
            received: c.received,
            duplicates: c.duplicates,
            sequence_conflicts: c.sequence_conflicts,
            suppressed: c.suppressed,
            evicted: c.evicted,
            evicted_pending: c.evicted_pending,
            dropped: c.dropped,
            unschedulable: c.unschedulable,
            pending: self.registry.iter().filter(|r| r.is_scheduled()).count(),
            retained: self.registry.len(),
            since: self.since,
        }
    }

    pub fn print_stats(&self) -> String {
        self.stats().to_string()
    }

    /// Retained broadcasts, oldest first
    pub fn packets(&self) -> Vec<BroadcastSummary<I>> {
        self.registry.iter().map(BroadcastSummary::from).collect()
    }

    pub fn print_packets(&self) -> String {
        self.packets()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<I, O, R> fmt::Debug for FloodController<I, O, R>
where
    I: PeerIdentity,
    O: LinkQualityOracle<I> + ?Sized,
    R: AddressResolver<I> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FloodController")
            .field("ip", &self.config.ip)
            .field("count", &self.config.count)
            .field("retained", &self.registry.len())
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}

// Encode and emit one copy of `record`, stamped with this node as sender.
fn transmit<I, R, S>(
    config: &FloodConfig<I>,
    resolver: &R,
    record: &mut BroadcastRecord<I>,
    sink: &mut S,
) -> bool
where
    I: PeerIdentity,
    R: AddressResolver<I> + ?Sized,
    S: FloodSink + ?Sized,
{
    let dst = resolver
        .lookup(&config.bcast_ip)
        .unwrap_or(config.bcast_eth);
    let frame = FloodFrame::new(
        EtherHeader {
            dst,
            src: config.eth,
            ethertype: config.ethertype,
        },
        FloodHeader {
            sequence: record.sequence,
            originator: record.originator.clone(),
            sender: config.ip.clone(),
        },
        record.payload.clone(),
    );

    match frame.encode() {
        Ok(bytes) => {
            sink.transmit(bytes);
            record.tx_count += 1;
            true
        }
        Err(e) => {
            warn!(seq = record.sequence, error = %e, "Failed to encode broadcast");
            false
        }
    }
}
