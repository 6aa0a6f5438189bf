//! Broadcast records and the bounded registry that holds them
//!
//! The registry is a deque in arrival order: new broadcasts are appended at
//! the tail and history trimming evicts from the head. There is exactly one
//! record per retained sequence number.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;

use ripple_core::PeerIdentity;

use crate::error::{FloodError, FloodResult};
use crate::scheduler::TimerHandle;

/// Progress of one broadcast
///
/// The live timer lives inside `Scheduled`, so a record has a timer exactly
/// when it is scheduled and not yet decided.
#[derive(Debug)]
pub enum BroadcastState {
    /// Created, not yet scheduled
    New,
    /// Waiting for its forwarding timer
    Scheduled(TimerHandle),
    /// Forwarded (terminal)
    Sent,
    /// Decided not to forward (terminal)
    Suppressed,
}

impl BroadcastState {
    pub fn name(&self) -> &'static str {
        match self {
            BroadcastState::New => "new",
            BroadcastState::Scheduled(_) => "scheduled",
            BroadcastState::Sent => "sent",
            BroadcastState::Suppressed => "suppressed",
        }
    }
}

/// One flooded packet instance
#[derive(Debug)]
pub struct BroadcastRecord<I: PeerIdentity> {
    pub sequence: u32,
    /// This node started the broadcast
    pub originated: bool,
    /// Node that started the broadcast
    pub originator: I,
    pub payload: Bytes,
    /// Distinct receptions observed
    pub rx_count: u32,
    /// Transmissions by this node
    pub tx_count: u32,
    /// Time of the first reception (None if originated here)
    pub first_rx: Option<Instant>,
    pub state: BroadcastState,
    /// Computed fire time
    pub send_at: Option<Instant>,
    /// Who the first copy came from (None if originated here)
    pub received_from: Option<I>,
    /// Other senders overheard, in arrival order
    pub extra_receivers: Vec<I>,
    pub delay: Duration,
    pub neighbor_weight: f64,
    pub expected_rx: f64,
    pub slot: Option<u32>,
}

impl<I: PeerIdentity> BroadcastRecord<I> {
    /// A broadcast started by this node
    pub fn originated(sequence: u32, originator: I, payload: Bytes) -> Self {
        Self::blank(sequence, true, originator, payload)
    }

    /// A broadcast first heard from `sender`
    pub fn received(sequence: u32, originator: I, sender: I, payload: Bytes, now: Instant) -> Self {
        let mut record = Self::blank(sequence, false, originator, payload);
        record.rx_count = 1;
        record.first_rx = Some(now);
        record.received_from = Some(sender);
        record
    }

    fn blank(sequence: u32, originated: bool, originator: I, payload: Bytes) -> Self {
        Self {
            sequence,
            originated,
            originator,
            payload,
            rx_count: 0,
            tx_count: 0,
            first_rx: None,
            state: BroadcastState::New,
            send_at: None,
            received_from: None,
            extra_receivers: Vec::new(),
            delay: Duration::ZERO,
            neighbor_weight: 0.0,
            expected_rx: 0.0,
            slot: None,
        }
    }

    /// Record an overheard copy from `sender`
    ///
    /// Returns true when this is a distinct reception. A sender already
    /// known to have the packet is not counted again.
    pub fn note_reception(&mut self, sender: &I) -> bool {
        if self.has_heard_from(sender) {
            return false;
        }
        self.extra_receivers.push(sender.clone());
        self.rx_count += 1;
        true
    }

    /// Whether `sender` is already known to have transmitted this packet
    pub fn has_heard_from(&self, sender: &I) -> bool {
        self.received_from.as_ref() == Some(sender) || self.extra_receivers.contains(sender)
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self.state, BroadcastState::Scheduled(_))
    }

    /// Whether the broadcast reached a terminal state (sent or suppressed)
    pub fn is_sent(&self) -> bool {
        matches!(self.state, BroadcastState::Sent | BroadcastState::Suppressed)
    }

    /// Token of the live timer, if any
    pub fn timer_token(&self) -> Option<u64> {
        match &self.state {
            BroadcastState::Scheduled(handle) => Some(handle.token()),
            _ => None,
        }
    }

    /// Release the live timer without deciding, returning whether one existed
    pub fn cancel_timer(&mut self) -> bool {
        if self.is_scheduled() {
            self.state = BroadcastState::New;
            true
        } else {
            false
        }
    }
}

/// A record removed by history trimming
#[derive(Debug)]
pub struct EvictedBroadcast<I: PeerIdentity> {
    pub record: BroadcastRecord<I>,
    /// The record still had a live timer when evicted
    pub was_pending: bool,
}

/// Bounded, arrival-ordered set of broadcasts
#[derive(Debug)]
pub struct BroadcastRegistry<I: PeerIdentity> {
    records: VecDeque<BroadcastRecord<I>>,
}

impl<I: PeerIdentity> BroadcastRegistry<I> {
    pub fn new() -> Self {
        Self {
            records: VecDeque::new(),
        }
    }

    // Newest records are the most likely to be looked up, so search from the tail.
    pub fn find(&self, sequence: u32) -> Option<&BroadcastRecord<I>> {
        self.records.iter().rev().find(|r| r.sequence == sequence)
    }

    pub fn find_mut(&mut self, sequence: u32) -> Option<&mut BroadcastRecord<I>> {
        self.records.iter_mut().rev().find(|r| r.sequence == sequence)
    }

    /// Append a record at the tail
    pub fn insert(&mut self, record: BroadcastRecord<I>) -> FloodResult<()> {
        if self.find(record.sequence).is_some() {
            return Err(FloodError::DuplicateSequence(record.sequence));
        }
        self.records.push_back(record);
        Ok(())
    }

    /// Evict from the head until at most `max_history` records remain
    ///
    /// Live timers are cancelled before the record is handed back.
    pub fn trim(&mut self, max_history: usize) -> Vec<EvictedBroadcast<I>> {
        let mut evicted = Vec::new();
        while self.records.len() > max_history {
            let Some(mut record) = self.records.pop_front() else {
                break;
            };
            let was_pending = record.cancel_timer();
            evicted.push(EvictedBroadcast {
                record,
                was_pending,
            });
        }
        evicted
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &BroadcastRecord<I>> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record, cancelling their timers
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl<I: PeerIdentity> Default for BroadcastRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}
