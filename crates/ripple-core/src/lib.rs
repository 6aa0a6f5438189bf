//! # Ripple Core
//!
//! Core traits, types, and errors for the Ripple flooding stack.
//!
//! This crate provides the foundational abstractions that allow the same
//! flood suppression logic to run in simulation (char identities, synthetic
//! link tables) and on real links (IPv4 addresses over Ethernet framing).
//!
//! ## Key Traits
//!
//! - [`PeerIdentity`]: Abstraction over node addresses
//! - [`LinkQualityOracle`]: Delivery probability and neighbor weight estimates
//! - [`AddressResolver`]: Network address to link address bindings
//! - [`Clock`]: Time abstraction for testability
//!
//! ## Key Types
//!
//! - [`FloodFrame`]: Ethernet + flood header + payload codec
//! - [`MacAddress`]: Link-layer address
//! - [`LinkTable`] / [`ArpTable`]: In-memory collaborator tables

pub mod error;
pub mod frame;
pub mod identity;
pub mod link_table;
pub mod traits;

// Re-export main types
pub use error::*;
pub use frame::*;
pub use identity::*;
pub use link_table::*;
pub use traits::*;
