//! # Ripple Flood
//!
//! Probabilistic flood suppression for wireless ad-hoc meshes.
//!
//! Every node that hears a flooded packet for the first time delivers it
//! upward and schedules a rebroadcast after a short delay. While it waits it
//! keeps listening: each further copy it overhears is evidence that its
//! neighbors are already covered. When the timer fires the node forwards only
//! if it has heard fewer than `COUNT` copies.
//!
//! ## Features
//!
//! - **Coverage estimation**: per-sequence probabilities that each neighbor
//!   already holds a packet, folded from every overheard copy and the link
//!   qualities reported by a [`LinkQualityOracle`](ripple_core::LinkQualityOracle).
//!
//! - **Slotted jitter**: optionally quantize delays so that nodes expecting to
//!   reach more uncovered neighbors transmit first.
//!
//! - **Bounded memory**: only the most recent `HISTORY` broadcasts are retained;
//!   eviction cancels pending timers.
//!
//! - **Async driver**: [`FloodService`] runs a controller on a tokio task.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Instant;
//! use ripple_core::{ArpTable, LinkTable, MacAddress};
//! use ripple_flood::{FloodConfig, FloodController, FloodOutput};
//!
//! let config = FloodConfig::builder()
//!     .ethertype(0x0941)
//!     .ip(my_ip)
//!     .bcast_ip(bcast_ip)
//!     .eth(my_mac)
//!     .count(2)
//!     .build()?;
//! let mut node = FloodController::new(config, Arc::new(links), Arc::new(ArpTable::new()))?;
//!
//! let mut out: Vec<FloodOutput> = Vec::new();
//! node.handle_link_frame(&frame, Instant::now(), &mut out);
//! node.poll_timers(Instant::now(), &mut out);
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: Node configuration, tunables and presets
//! - [`probability`]: Per-sequence neighbor reception probabilities
//! - [`registry`]: Broadcast records and the bounded history
//! - [`scheduler`]: One-shot forwarding timers
//! - [`decision`]: Delay, slot and suppression decisions
//! - [`controller`]: The per-node state machine and control surface
//! - [`service`]: Tokio driver
//! - [`error`]: Flood-specific error types

pub mod config;
pub mod controller;
pub mod decision;
pub mod error;
pub mod probability;
pub mod registry;
pub mod scheduler;
pub mod service;

// Re-exports
pub use config::{
    ConfigWarning, DEFAULT_HISTORY, DEFAULT_MAX_DELAY_MS, DEFAULT_MIN_P, DEFAULT_SLOT_TIME_MS,
    EvictionPolicy, FloodConfig, FloodConfigBuilder, FloodSettings, MAX_DELAY_LIMIT_MS,
};
pub use controller::{
    BroadcastSummary, DropReason, FloodController, FloodOutput, FloodSink, FloodStats,
    LinkIngress,
};
pub use decision::{FloodDecision, ForwardDecisionEngine, SchedulePlan, SuppressReason};
pub use error::{ConfigError, FloodError, FloodResult, ScheduleError};
pub use probability::{SequenceProbabilityRecord, SequenceProbabilityTable};
pub use registry::{BroadcastRecord, BroadcastRegistry, BroadcastState, EvictedBroadcast};
pub use scheduler::{Scheduler, TimerFired, TimerHandle};
pub use service::{DEFAULT_CHANNEL_CAPACITY, FloodHandle, FloodService};
