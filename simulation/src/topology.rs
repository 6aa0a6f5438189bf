//! Mesh topology definitions for the flood simulator
//!
//! Provides functions to create various network topologies:
//! - Line, ring and star
//! - Full mesh: Every node connected to every other
//! - Grid: Nodes laid out row by row
//! - Random: Configurable connection probability
//! - Custom: Build from an edge list
//!
//! Every link carries a delivery probability, the same in both directions.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ripple_core::{LinkQualityOracle, SimulationIdentity};

use crate::error::{SimError, SimResult};

/// Identity reserved as the network broadcast address
pub const BROADCAST_NODE: SimulationIdentity = SimulationIdentity('Z');

/// Largest mesh the simulator supports ('A'..='Y')
pub const MAX_NODES: usize = 25;

/// A mesh network topology
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    adjacency: BTreeMap<SimulationIdentity, BTreeSet<SimulationIdentity>>,
    /// Link probability keyed by (lower, higher) node
    links: BTreeMap<(SimulationIdentity, SimulationIdentity), f64>,
}

fn link_key(
    a: SimulationIdentity,
    b: SimulationIdentity,
) -> (SimulationIdentity, SimulationIdentity) {
    if a < b { (a, b) } else { (b, a) }
}

impl Mesh {
    /// Create an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the mesh
    pub fn add_node(&mut self, node: SimulationIdentity) -> SimResult<()> {
        if node == BROADCAST_NODE {
            return Err(SimError::ReservedNode(node));
        }
        self.adjacency.entry(node).or_default();
        Ok(())
    }

    /// Add (or update) a bidirectional link between two nodes
    pub fn connect(
        &mut self,
        a: SimulationIdentity,
        b: SimulationIdentity,
        probability: f64,
    ) -> SimResult<()> {
        if a == b {
            return Ok(()); // No self-loops
        }
        if !(0.0..=1.0).contains(&probability) {
            return Err(SimError::InvalidProbability(probability));
        }
        self.add_node(a)?;
        self.add_node(b)?;

        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
        self.links.insert(link_key(a, b), probability);
        Ok(())
    }

    /// Check if two nodes are directly connected
    pub fn are_connected(&self, a: SimulationIdentity, b: SimulationIdentity) -> bool {
        self.links.contains_key(&link_key(a, b))
    }

    /// Delivery probability of the link between two nodes
    pub fn probability(&self, a: SimulationIdentity, b: SimulationIdentity) -> Option<f64> {
        self.links.get(&link_key(a, b)).copied()
    }

    /// Neighbors of a node in identity order
    pub fn neighbors_of(&self, node: SimulationIdentity) -> impl Iterator<Item = SimulationIdentity> + '_ {
        self.adjacency.get(&node).into_iter().flatten().copied()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> Vec<SimulationIdentity> {
        self.adjacency.keys().copied().collect()
    }

    pub fn contains(&self, node: SimulationIdentity) -> bool {
        self.adjacency.contains_key(&node)
    }

    /// Get number of nodes
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Get number of links (edges)
    pub fn edge_count(&self) -> usize {
        self.links.len()
    }

    /// Nodes reachable from `start` over links with non-zero probability
    pub fn reachable_from(&self, start: SimulationIdentity) -> BTreeSet<SimulationIdentity> {
        let mut seen = BTreeSet::new();
        if !self.contains(start) {
            return seen;
        }
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            for next in self.neighbors_of(node) {
                if self.probability(node, next).is_some_and(|p| p > 0.0) && !seen.contains(&next) {
                    stack.push(next);
                }
            }
        }
        seen
    }

    /// Print a simple ASCII visualization of the mesh
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Mesh Topology:\n");
        output.push_str(&format!("  Nodes: {}\n", self.node_count()));
        output.push_str(&format!("  Links: {}\n\n", self.edge_count()));

        for (node, neighbors) in &self.adjacency {
            let neighbor_str: Vec<String> = neighbors
                .iter()
                .map(|n| format!("{}({:.2})", n, self.probability(*node, *n).unwrap_or(0.0)))
                .collect();
            output.push_str(&format!("  {} -> [{}]\n", node, neighbor_str.join(", ")));
        }
        output
    }
}

impl LinkQualityOracle<SimulationIdentity> for Mesh {
    fn neighbors(&self, node: &SimulationIdentity) -> Vec<SimulationIdentity> {
        self.neighbors_of(*node).collect()
    }

    fn link_probability(&self, from: &SimulationIdentity, to: &SimulationIdentity) -> Option<f64> {
        self.probability(*from, *to)
    }
}

/// Builder for creating mesh topologies
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    nodes: Vec<SimulationIdentity>,
    link_probability: f64,
}

impl MeshBuilder {
    /// Create a builder with the given number of nodes (A, B, C, ...)
    pub fn new(node_count: usize) -> SimResult<Self> {
        if node_count == 0 || node_count > MAX_NODES {
            return Err(SimError::NodeCount(node_count));
        }
        Ok(Self {
            nodes: SimulationIdentity::first(node_count),
            link_probability: 1.0,
        })
    }

    /// Delivery probability given to every link the builder creates
    pub fn link_probability(mut self, probability: f64) -> SimResult<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(SimError::InvalidProbability(probability));
        }
        self.link_probability = probability;
        Ok(self)
    }

    fn empty(&self) -> SimResult<Mesh> {
        let mut mesh = Mesh::new();
        for node in &self.nodes {
            mesh.add_node(*node)?;
        }
        Ok(mesh)
    }

    /// Build a line topology: A - B - C - D - ...
    pub fn line(self) -> SimResult<Mesh> {
        let mut mesh = self.empty()?;
        for pair in self.nodes.windows(2) {
            mesh.connect(pair[0], pair[1], self.link_probability)?;
        }
        Ok(mesh)
    }

    /// Build a ring topology where each node is connected to its neighbors
    ///
    /// A - B - C - D - ... - A
    pub fn ring(self) -> SimResult<Mesh> {
        let mut mesh = self.empty()?;
        let n = self.nodes.len();
        if n > 2 {
            for i in 0..n {
                mesh.connect(self.nodes[i], self.nodes[(i + 1) % n], self.link_probability)?;
            }
        } else if n == 2 {
            mesh.connect(self.nodes[0], self.nodes[1], self.link_probability)?;
        }
        Ok(mesh)
    }

    /// Build a star topology: A in center, connected to all others
    pub fn star(self) -> SimResult<Mesh> {
        let mut mesh = self.empty()?;
        let center = self.nodes[0];
        for node in self.nodes.iter().skip(1) {
            mesh.connect(center, *node, self.link_probability)?;
        }
        Ok(mesh)
    }

    /// Build a full mesh where every node is connected to every other
    pub fn full_mesh(self) -> SimResult<Mesh> {
        let mut mesh = self.empty()?;
        for i in 0..self.nodes.len() {
            for j in (i + 1)..self.nodes.len() {
                mesh.connect(self.nodes[i], self.nodes[j], self.link_probability)?;
            }
        }
        Ok(mesh)
    }

    /// Build a grid `width` nodes wide, connecting horizontal and vertical neighbors
    pub fn grid(self, width: usize) -> SimResult<Mesh> {
        let width = width.max(1);
        let mut mesh = self.empty()?;
        for (i, node) in self.nodes.iter().enumerate() {
            let right = self.nodes.get(i + 1).filter(|_| (i + 1) % width != 0);
            if let Some(right) = right {
                mesh.connect(*node, *right, self.link_probability)?;
            }
            if let Some(below) = self.nodes.get(i + width) {
                mesh.connect(*node, *below, self.link_probability)?;
            }
        }
        Ok(mesh)
    }

    /// Build a random mesh with given connection probability
    ///
    /// Isolated nodes are attached to a random other node so the mesh stays
    /// usable for flooding.
    pub fn random(self, connection_probability: f64, seed: u64) -> SimResult<Mesh> {
        if !(0.0..=1.0).contains(&connection_probability) {
            return Err(SimError::InvalidProbability(connection_probability));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut mesh = self.empty()?;
        let n = self.nodes.len();

        for i in 0..n {
            for j in (i + 1)..n {
                if rng.random::<f64>() < connection_probability {
                    mesh.connect(self.nodes[i], self.nodes[j], self.link_probability)?;
                }
            }
        }

        if n > 1 {
            for i in 0..n {
                let node = self.nodes[i];
                if mesh.neighbors_of(node).next().is_none() {
                    let offset = rng.random_range(1..n);
                    mesh.connect(node, self.nodes[(i + offset) % n], self.link_probability)?;
                }
            }
        }

        Ok(mesh)
    }
}

/// Create a custom mesh from an edge list of `(a, b, probability)`
pub fn from_edges(edges: &[(char, char, f64)]) -> SimResult<Mesh> {
    let mut mesh = Mesh::new();

    for (a, b, probability) in edges {
        let node_a = SimulationIdentity::new(*a).ok_or(SimError::InvalidNode(*a))?;
        let node_b = SimulationIdentity::new(*b).ok_or(SimError::InvalidNode(*b))?;
        mesh.connect(node_a, node_b, *probability)?;
    }

    Ok(mesh)
}
