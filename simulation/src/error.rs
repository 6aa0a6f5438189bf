//! Simulation errors

use ripple_core::SimulationIdentity;
use ripple_flood::FloodError;
use thiserror::Error;

use crate::topology::MAX_NODES;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Mesh size {0} out of range (1..={max})", max = MAX_NODES)]
    NodeCount(usize),

    #[error("Invalid node id {0:?}: expected 'A'..='Y'")]
    InvalidNode(char),

    #[error("Node {0} is reserved as the broadcast address")]
    ReservedNode(SimulationIdentity),

    #[error("Node {0} is not part of the mesh")]
    UnknownNode(SimulationIdentity),

    #[error("Probability {0} is outside 0..=1")]
    InvalidProbability(f64),

    #[error("Flood error: {0}")]
    Flood(#[from] FloodError),
}

pub type SimResult<T> = Result<T, SimError>;
