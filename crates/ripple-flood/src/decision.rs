//! Forwarding decisions
//!
//! The engine answers two questions for every broadcast:
//!
//! - **When**: how long to wait before forwarding. Plain jitter is uniform
//!   over `[0, max_delay]`. With slot picking the window is cut into slots
//!   and nodes expecting to add more coverage take earlier slots, so their
//!   copy is more likely to be the one that suppresses the others.
//! - **Whether**: at fire time, forward unless `count` copies were already
//!   heard.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ripple_core::{LinkQualityOracle, PeerIdentity};

use crate::config::{FloodConfig, FloodSettings};
use crate::probability::SequenceProbabilityTable;

/// Forward or not, evaluated with the latest reception count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodDecision {
    /// Rebroadcast the packet
    Forward,
    /// Stay quiet
    Suppress { reason: SuppressReason },
}

impl FloodDecision {
    pub fn is_forward(&self) -> bool {
        matches!(self, FloodDecision::Forward)
    }
}

/// Why a broadcast was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Enough copies were heard from other nodes
    ThresholdReached { received: u32, threshold: u32 },
}

/// Timing chosen for one broadcast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulePlan {
    pub delay: Duration,
    /// Chosen slot, if slot picking applied
    pub slot: Option<u32>,
    pub neighbor_weight: f64,
    pub expected_rx: f64,
}

/// Slot picking parameters
#[derive(Debug, Clone, Copy)]
struct SlotPolicy {
    slot_time: Duration,
    slots: u32,
    use_erx: bool,
    use_nweight: bool,
}

impl SlotPolicy {
    fn from_settings(settings: &FloodSettings) -> Option<Self> {
        if !settings.pick_slots || settings.slot_time_ms == 0 {
            return None;
        }
        let slots = (settings.max_delay_ms / settings.slot_time_ms).clamp(1, u32::MAX as u64);
        Some(Self {
            slot_time: settings.slot_time(),
            slots: slots as u32,
            use_erx: settings.slots_erx,
            use_nweight: settings.slots_nweight,
        })
    }
}

/// Computes delays, slots and the suppression predicate
#[derive(Debug)]
pub struct ForwardDecisionEngine {
    count: u32,
    min_p: f64,
    lossy: bool,
    max_delay: Duration,
    origin_jitter: Duration,
    slots: Option<SlotPolicy>,
    rng: StdRng,
}

impl ForwardDecisionEngine {
    /// Create an engine for a node configuration
    ///
    /// The jitter generator is seeded from `rng_seed` when set.
    pub fn new<I: PeerIdentity>(config: &FloodConfig<I>) -> Self {
        let settings = &config.settings;
        let rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            count: config.count,
            min_p: settings.min_p,
            lossy: settings.lossy,
            max_delay: settings.max_delay(),
            origin_jitter: settings.origin_jitter(),
            slots: SlotPolicy::from_settings(settings),
            rng,
        }
    }

    pub fn min_p(&self) -> f64 {
        self.min_p
    }

    /// Callers validate the range
    pub fn set_min_p(&mut self, min_p: f64) {
        self.min_p = min_p;
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Topological weight of `node`
    pub fn neighbor_weight<I, O>(&self, oracle: &O, node: &I) -> f64
    where
        I: PeerIdentity,
        O: LinkQualityOracle<I> + ?Sized,
    {
        oracle.neighbor_weight(node).max(0.0)
    }

    /// Expected number of neighbors of `local` that would newly receive
    /// `sequence` if `local` transmitted it now
    pub fn expected_rx<I, O>(
        &self,
        table: &SequenceProbabilityTable<I>,
        oracle: &O,
        sequence: u32,
        local: &I,
    ) -> f64
    where
        I: PeerIdentity,
        O: LinkQualityOracle<I> + ?Sized,
    {
        oracle
            .neighbors(local)
            .iter()
            .filter(|n| *n != local)
            .filter_map(|n| {
                let p = table.get_prob(sequence, n).unwrap_or(0.0);
                if p >= self.min_p {
                    return None;
                }
                let link = if self.lossy {
                    oracle.link_probability(local, n).unwrap_or(0.0)
                } else {
                    1.0
                };
                Some(link.clamp(0.0, 1.0) * (1.0 - p))
            })
            .sum()
    }

    /// Choose the delay for a new broadcast
    pub fn plan(&mut self, originated: bool, neighbor_weight: f64, expected_rx: f64) -> SchedulePlan {
        let mut plan = SchedulePlan {
            delay: Duration::ZERO,
            slot: None,
            neighbor_weight,
            expected_rx,
        };

        if originated {
            plan.delay = self.uniform(self.origin_jitter);
            return plan;
        }

        match self.slots {
            None => plan.delay = self.uniform(self.max_delay),
            Some(policy) => {
                let slot = self.pick_slot(&policy, neighbor_weight, expected_rx);
                let offset = self.below(policy.slot_time);
                let start = policy.slot_time.saturating_mul(slot);
                plan.delay = start.saturating_add(offset).min(self.max_delay);
                plan.slot = Some(slot);
            }
        }
        plan
    }

    /// Suppression predicate for the current reception count
    pub fn decide(&self, rx_count: u32) -> FloodDecision {
        if self.count != 0 && rx_count >= self.count {
            FloodDecision::Suppress {
                reason: SuppressReason::ThresholdReached {
                    received: rx_count,
                    threshold: self.count,
                },
            }
        } else {
            FloodDecision::Forward
        }
    }

    /// A random starting sequence number
    pub fn random_sequence(&mut self) -> u32 {
        self.rng.random()
    }

    fn pick_slot(&mut self, policy: &SlotPolicy, neighbor_weight: f64, expected_rx: f64) -> u32 {
        let last = policy.slots - 1;
        if !policy.use_erx && !policy.use_nweight {
            return self.rng.random_range(0..=last);
        }

        let mut score = 0.0;
        if policy.use_erx {
            score += expected_rx;
        }
        if policy.use_nweight {
            score += neighbor_weight;
        }

        let rank = if score.is_finite() && score > 0.0 {
            score.floor().min(last as f64) as u32
        } else {
            0
        };
        last - rank
    }

    // Uniform over [0, max]
    fn uniform(&mut self, max: Duration) -> Duration {
        let max_us = max.as_micros().min(u64::MAX as u128) as u64;
        Duration::from_micros(self.rng.random_range(0..=max_us))
    }

    // Uniform over [0, width)
    fn below(&mut self, width: Duration) -> Duration {
        let width_us = width.as_micros().min(u64::MAX as u128) as u64;
        if width_us == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.rng.random_range(0..width_us))
    }
}
