//! Core traits for Ripple
//!
//! These traits describe the collaborators a flood node consumes but does
//! not implement itself.
//!
//! ## Key Traits
//!
//! - [`LinkQualityOracle`]: delivery probabilities and neighbor importance
//! - [`AddressResolver`]: network address to link address mapping
//! - [`Clock`]: Time abstraction for testability

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::identity::{MacAddress, PeerIdentity};

/// Abstraction over the link-quality metric
///
/// The metric itself is computed elsewhere (hello exchanges or ETX); this
/// trait only exposes its results to the flooding logic.
pub trait LinkQualityOracle<I: PeerIdentity>: Send + Sync {
    /// Known neighbors of a node
    fn neighbors(&self, node: &I) -> Vec<I>;

    /// Estimated probability that a frame sent by `from` is received by `to`
    ///
    /// Returns `None` when there is no metric for the pair.
    fn link_probability(&self, from: &I, to: &I) -> Option<f64>;

    /// Topological importance of a node
    ///
    /// Defaults to the number of neighbors with a usable link.
    fn neighbor_weight(&self, node: &I) -> f64 {
        self.neighbors(node)
            .iter()
            .filter(|n| self.link_probability(node, n).is_some_and(|p| p > 0.0))
            .count() as f64
    }
}

/// Maps network addresses to link-layer addresses
pub trait AddressResolver<I: PeerIdentity>: Send + Sync {
    /// Link address for a network address, if known
    fn lookup(&self, address: &I) -> Option<MacAddress>;

    /// Record a binding observed on the wire
    fn learn(&self, address: &I, mac: MacAddress);
}

/// Time abstraction for testability
///
/// This trait allows tests to control time, enabling deterministic
/// testing of time-dependent behavior.
pub trait Clock: Send + Sync {
    /// Get the current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get the current UTC datetime
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real clock implementation using system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulation
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    start_utc: DateTime<Utc>,
    elapsed: Arc<RwLock<Duration>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            start_utc: Utc::now(),
            elapsed: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.write().unwrap_or_else(|e| e.into_inner());
        *elapsed += by;
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or(chrono::TimeDelta::MAX);
        self.start_utc + elapsed
    }
}
