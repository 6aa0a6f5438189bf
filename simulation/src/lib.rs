//! # Ripple Simulation
//!
//! A discrete-event simulator for probabilistic flood suppression.
//!
//! ## Overview
//!
//! Each node of a [`Mesh`] runs its own flood controller. Transmissions are
//! delivered to every neighbor independently according to the link's delivery
//! probability, so the effect of COUNT, slotting and early suppression on
//! redundancy and coverage can be measured.
//!
//! ## Architecture
//!
//! - **Topology** (`topology.rs`): Mesh construction (line, ring, star, grid, random, ...)
//! - **Simulation** (`simulation.rs`): Virtual-time event loop
//! - **Scenarios** (`scenarios.rs`): Single floods, COUNT sweeps, preset comparison
//!
//! ## Example
//!
//! ```rust,ignore
//! use ripple_simulation::*;
//!
//! let mesh = MeshBuilder::new(9)?.link_probability(0.9)?.grid(3)?;
//! let mut sim = Simulation::new(mesh, SimConfig::default())?;
//! sim.originate(SimulationIdentity('A'), bytes::Bytes::from_static(b"hello"))?;
//!
//! let report = sim.run();
//! println!("{}", report);
//! ```

pub mod error;
pub mod scenarios;
pub mod simulation;
pub mod topology;

pub use error::{SimError, SimResult};
pub use scenarios::{SweepRow, format_sweep, run_flood, run_grid_comparison, sweep_counts};
pub use simulation::{FloodReport, SIM_ETHERTYPE, SimConfig, SimReport, Simulation};
pub use topology::{BROADCAST_NODE, MAX_NODES, Mesh, MeshBuilder, from_edges};

// Re-export core types for integration
pub use ripple_core::SimulationIdentity;
