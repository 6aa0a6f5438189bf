//! Per-sequence reception probabilities
//!
//! For every retained sequence number the table tracks how likely each
//! neighbor is to already hold that packet. Knowledge accumulates from every
//! copy heard on the air:
//!
//! - **Direct evidence**: the sender of a copy has the packet (P = 1)
//! - **Inferred evidence**: each neighbor of the sender heard that copy with
//!   the sender's link probability, so
//!   `P_new = 1 - (1 - P_old) * (1 - link(sender, neighbor))`
//!
//! Records are never removed one at a time; the table is trimmed from the
//! oldest end as sequences fall out of history.

use std::collections::{HashMap, VecDeque};

use ripple_core::{LinkQualityOracle, PeerIdentity};

/// Reception probabilities for one sequence number
#[derive(Debug, Clone)]
pub struct SequenceProbabilityRecord<I: PeerIdentity> {
    /// The sequence these probabilities describe
    pub sequence: u32,
    /// neighbor -> probability it has the packet
    pub neighbor_probability: HashMap<I, f64>,
}

impl<I: PeerIdentity> SequenceProbabilityRecord<I> {
    fn new(sequence: u32) -> Self {
        Self {
            sequence,
            neighbor_probability: HashMap::new(),
        }
    }
}

/// Bounded table of [`SequenceProbabilityRecord`]s in arrival order
#[derive(Debug, Clone)]
pub struct SequenceProbabilityTable<I: PeerIdentity> {
    records: VecDeque<SequenceProbabilityRecord<I>>,
}

impl<I: PeerIdentity> SequenceProbabilityTable<I> {
    pub fn new() -> Self {
        Self {
            records: VecDeque::new(),
        }
    }

    /// Probability that `neighbor` has `sequence`
    ///
    /// `None` means nothing is known, which is distinct from `Some(0.0)`.
    pub fn get_prob(&self, sequence: u32, neighbor: &I) -> Option<f64> {
        self.record(sequence)
            .and_then(|r| r.neighbor_probability.get(neighbor).copied())
    }

    /// Set the probability directly, creating the sequence record on demand
    pub fn set_prob(&mut self, sequence: u32, neighbor: &I, probability: f64) {
        let probability = probability.clamp(0.0, 1.0);
        self.record_mut_or_insert(sequence)
            .neighbor_probability
            .insert(neighbor.clone(), probability);
    }

    /// Fold in one observed transmission of `sequence` by `sender`
    ///
    /// With `lossy` disabled every known neighbor of the sender is assumed
    /// to have heard it.
    pub fn update_probs<O>(&mut self, sequence: u32, sender: &I, oracle: &O, lossy: bool)
    where
        O: LinkQualityOracle<I> + ?Sized,
    {
        let sender_neighbors = oracle.neighbors(sender);
        let record = self.record_mut_or_insert(sequence);
        record.neighbor_probability.insert(sender.clone(), 1.0);

        for neighbor in sender_neighbors {
            if &neighbor == sender {
                continue;
            }
            let link = if lossy {
                oracle.link_probability(sender, &neighbor).unwrap_or(0.0)
            } else {
                1.0
            };
            let entry = record.neighbor_probability.entry(neighbor).or_insert(0.0);
            let p_new = 1.0 - (1.0 - *entry) * (1.0 - link.clamp(0.0, 1.0));
            *entry = p_new.clamp(0.0, 1.0);
        }
    }

    /// Record for a sequence, if retained
    pub fn record(&self, sequence: u32) -> Option<&SequenceProbabilityRecord<I>> {
        self.records.iter().rev().find(|r| r.sequence == sequence)
    }

    /// Drop the oldest records until at most `max_history` remain
    ///
    /// Returns the number of records removed.
    pub fn trim(&mut self, max_history: usize) -> usize {
        let mut removed = 0;
        while self.records.len() > max_history {
            self.records.pop_front();
            removed += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn record_mut_or_insert(&mut self, sequence: u32) -> &mut SequenceProbabilityRecord<I> {
        match self.records.iter().rposition(|r| r.sequence == sequence) {
            Some(index) => &mut self.records[index],
            None => {
                self.records.push_back(SequenceProbabilityRecord::new(sequence));
                let last = self.records.len() - 1;
                &mut self.records[last]
            }
        }
    }
}

impl<I: PeerIdentity> Default for SequenceProbabilityTable<I> {
    fn default() -> Self {
        Self::new()
    }
}
