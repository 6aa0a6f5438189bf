//! Discrete-event simulation engine
//!
//! Every node runs its own [`FloodController`] against a shared virtual
//! clock. Frames and timer expirations are the only events:
//! - a transmission reaches each neighbor independently with the link's
//!   delivery probability, after a fixed propagation delay
//! - arrivals are ordered by (time, insertion)
//! - a timer due at the same instant as an arrival fires after it
//!
//! The event loop is single threaded; node logs are attributed through
//! [`with_node_context!`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ripple_core::{ArpTable, Clock, ManualClock, SimulationIdentity};
use ripple_flood::{
    FloodConfig, FloodController, FloodOutput, FloodSettings, FloodStats, LinkIngress,
};
use ripple_logging::with_node_context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::{SimError, SimResult};
use crate::topology::{BROADCAST_NODE, Mesh};

/// Ethertype used on the simulated links
pub const SIM_ETHERTYPE: u16 = 0x0941;

type NodeController = FloodController<SimulationIdentity, Mesh, ArpTable<SimulationIdentity>>;

/// Configuration for the simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Suppression threshold applied on every node
    pub count: u32,
    /// Flood settings applied on every node
    pub settings: FloodSettings,
    /// Time a frame spends on a link (ms)
    pub propagation_delay_ms: u64,
    /// Seed for link loss and per-node jitter
    pub seed: u64,
    /// Stop after this many events
    pub max_events: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            count: 2,
            settings: FloodSettings::default(),
            propagation_delay_ms: 1,
            seed: 0,
            max_events: 1_000_000,
        }
    }
}

impl SimConfig {
    pub fn propagation_delay(&self) -> Duration {
        Duration::from_millis(self.propagation_delay_ms)
    }
}

#[derive(Debug)]
struct Arrival {
    at: Duration,
    order: u64,
    from: SimulationIdentity,
    to: SimulationIdentity,
    frame: Bytes,
}

impl PartialEq for Arrival {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.order == other.order
    }
}

impl Eq for Arrival {}

impl PartialOrd for Arrival {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Arrival {
    // Min-heap on (at, order)
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.order.cmp(&self.order))
    }
}

enum NextEvent {
    Arrival,
    Timer(SimulationIdentity),
}

/// Reach of one broadcast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloodReport {
    pub sequence: u32,
    pub origin: SimulationIdentity,
    /// Nodes holding the broadcast, origin included
    pub reached: BTreeSet<SimulationIdentity>,
    /// Share of nodes reachable from the origin that got the broadcast
    pub coverage: f64,
}

/// Outcome of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    /// Frames put on the air
    pub transmissions: u64,
    /// Frames that made it across a link
    pub receptions: u64,
    /// Frames lost to link loss
    pub losses: u64,
    /// Broadcasts decided against forwarding, over all nodes
    pub suppressions: u64,
    /// Events processed
    pub events: usize,
    /// Virtual time of the last event
    pub elapsed_ms: f64,
    /// The event limit cut the run short
    pub truncated: bool,
    pub floods: Vec<FloodReport>,
    pub nodes: BTreeMap<SimulationIdentity, FloodStats>,
}

impl SimReport {
    /// Mean coverage over all broadcasts
    pub fn coverage(&self) -> f64 {
        if self.floods.is_empty() {
            return 0.0;
        }
        self.floods.iter().map(|f| f.coverage).sum::<f64>() / self.floods.len() as f64
    }

    /// Nodes reached by every broadcast
    pub fn reached(&self) -> usize {
        self.floods.iter().map(|f| f.reached.len()).min().unwrap_or(0)
    }
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "transmissions {} receptions {} losses {} suppressions {} events {} elapsed {:.1}ms{}",
            self.transmissions,
            self.receptions,
            self.losses,
            self.suppressions,
            self.events,
            self.elapsed_ms,
            if self.truncated { " (truncated)" } else { "" }
        )?;
        for flood in &self.floods {
            writeln!(
                f,
                "  seq {} from {}: reached {} coverage {:.1}%",
                flood.sequence,
                flood.origin,
                flood.reached.len(),
                flood.coverage * 100.0
            )?;
        }
        for (node, stats) in &self.nodes {
            writeln!(
                f,
                "  {} rx {} dup {} tx {} suppressed {}",
                node, stats.received, stats.duplicates, stats.forwarded, stats.suppressed
            )?;
        }
        Ok(())
    }
}

/// The simulation state
pub struct Simulation {
    mesh: Arc<Mesh>,
    config: SimConfig,
    clock: ManualClock,
    start: Instant,
    nodes: BTreeMap<SimulationIdentity, NodeController>,
    queue: BinaryHeap<Arrival>,
    next_order: u64,
    rng: StdRng,
    floods: BTreeMap<u32, (SimulationIdentity, BTreeSet<SimulationIdentity>)>,
    transmissions: u64,
    receptions: u64,
    losses: u64,
    events: usize,
    truncated: bool,
}

impl Simulation {
    /// Create a simulation with one flood controller per mesh node
    pub fn new(mesh: Mesh, config: SimConfig) -> SimResult<Self> {
        let mesh = Arc::new(mesh);
        let mut nodes = BTreeMap::new();

        for (index, node) in mesh.node_ids().into_iter().enumerate() {
            let settings = FloodSettings {
                rng_seed: Some(config.seed.wrapping_add(index as u64 + 1)),
                ..config.settings.clone()
            };
            let flood_config = FloodConfig::builder()
                .ethertype(SIM_ETHERTYPE)
                .ip(node)
                .bcast_ip(BROADCAST_NODE)
                .eth(node.mac())
                .count(config.count)
                .settings(settings)
                .build()
                .map_err(ripple_flood::FloodError::from)?;
            let controller = with_node_context!(&node, {
                FloodController::new(flood_config, Arc::clone(&mesh), Arc::new(ArpTable::new()))?
            });
            nodes.insert(node, controller);
        }

        let clock = ManualClock::new();
        let start = clock.now();
        debug!(nodes = nodes.len(), count = config.count, "Simulation created");

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            mesh,
            config,
            clock,
            start,
            nodes,
            queue: BinaryHeap::new(),
            next_order: 0,
            floods: BTreeMap::new(),
            transmissions: 0,
            receptions: 0,
            losses: 0,
            events: 0,
            truncated: false,
        })
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Virtual time since the simulation started
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// The controller running on `node`
    pub fn node(&self, node: SimulationIdentity) -> Option<&NodeController> {
        self.nodes.get(&node)
    }

    /// Start a broadcast at `origin` at the current virtual time
    pub fn originate(&mut self, origin: SimulationIdentity, payload: Bytes) -> SimResult<u32> {
        let now = self.clock.now();
        let controller = self
            .nodes
            .get_mut(&origin)
            .ok_or(SimError::UnknownNode(origin))?;

        let mut out: Vec<FloodOutput> = Vec::new();
        let sequence = with_node_context!(&origin, {
            controller.originate(payload, now, &mut out)?
        });
        info!(origin = %origin, seq = sequence, "Flood started");

        self.floods
            .insert(sequence, (origin, BTreeSet::from([origin])));
        self.dispatch(origin, out);
        Ok(sequence)
    }

    /// Run until no arrivals or timers remain (or the event limit is hit)
    pub fn run(&mut self) -> SimReport {
        while let Some((at, event)) = self.next_event() {
            if self.events >= self.config.max_events {
                warn!(events = self.events, "Event limit reached, stopping");
                self.truncated = true;
                break;
            }
            self.events += 1;
            self.advance_to(at);

            match event {
                NextEvent::Arrival => {
                    if let Some(arrival) = self.queue.pop() {
                        self.deliver(arrival);
                    }
                }
                NextEvent::Timer(node) => self.fire_timers(node),
            }
        }

        info!(
            transmissions = self.transmissions,
            events = self.events,
            elapsed_ms = self.elapsed().as_secs_f64() * 1000.0,
            "Simulation complete"
        );
        self.report()
    }

    /// Snapshot of the counters so far
    pub fn report(&self) -> SimReport {
        let floods = self
            .floods
            .iter()
            .map(|(sequence, (origin, reached))| {
                let reachable = self.mesh.reachable_from(*origin).len().max(1);
                FloodReport {
                    sequence: *sequence,
                    origin: *origin,
                    reached: reached.clone(),
                    coverage: reached.len() as f64 / reachable as f64,
                }
            })
            .collect();
        let nodes: BTreeMap<SimulationIdentity, FloodStats> = self
            .nodes
            .iter()
            .map(|(id, controller)| (*id, controller.stats()))
            .collect();

        SimReport {
            transmissions: self.transmissions,
            receptions: self.receptions,
            losses: self.losses,
            suppressions: nodes.values().map(|s| s.suppressed).sum(),
            events: self.events,
            elapsed_ms: self.elapsed().as_secs_f64() * 1000.0,
            truncated: self.truncated,
            floods,
            nodes,
        }
    }

    fn next_event(&mut self) -> Option<(Duration, NextEvent)> {
        let arrival = self.queue.peek().map(|a| a.at);

        let mut timer: Option<(Duration, SimulationIdentity)> = None;
        for (id, controller) in self.nodes.iter_mut() {
            if let Some(deadline) = controller.next_deadline() {
                let at = deadline.saturating_duration_since(self.start);
                if timer.is_none_or(|(best, _)| at < best) {
                    timer = Some((at, *id));
                }
            }
        }

        match (arrival, timer) {
            (Some(a), Some((t, node))) if t < a => Some((t, NextEvent::Timer(node))),
            (Some(a), _) => Some((a, NextEvent::Arrival)),
            (None, Some((t, node))) => Some((t, NextEvent::Timer(node))),
            (None, None) => None,
        }
    }

    fn advance_to(&mut self, at: Duration) {
        let elapsed = self.clock.elapsed();
        if at > elapsed {
            self.clock.advance(at - elapsed);
        }
    }

    fn deliver(&mut self, arrival: Arrival) {
        let now = self.clock.now();
        let Some(controller) = self.nodes.get_mut(&arrival.to) else {
            return;
        };

        let mut out: Vec<FloodOutput> = Vec::new();
        let ingress = with_node_context!(&arrival.to, {
            controller.handle_link_frame(&arrival.frame, now, &mut out)
        });
        trace!(from = %arrival.from, to = %arrival.to, ?ingress, "Frame arrived");

        if let LinkIngress::New { sequence } = ingress {
            if let Some((_, reached)) = self.floods.get_mut(&sequence) {
                reached.insert(arrival.to);
            }
        }
        self.dispatch(arrival.to, out);
    }

    fn fire_timers(&mut self, node: SimulationIdentity) {
        let now = self.clock.now();
        let Some(controller) = self.nodes.get_mut(&node) else {
            return;
        };

        let mut out: Vec<FloodOutput> = Vec::new();
        with_node_context!(&node, { controller.poll_timers(now, &mut out) });
        self.dispatch(node, out);
    }

    fn dispatch(&mut self, from: SimulationIdentity, outputs: Vec<FloodOutput>) {
        let at = self.clock.elapsed() + self.config.propagation_delay();

        for output in outputs {
            let FloodOutput::Transmit(frame) = output else {
                continue;
            };
            self.transmissions += 1;

            let neighbors: Vec<SimulationIdentity> = self.mesh.neighbors_of(from).collect();
            for to in neighbors {
                let probability = self.mesh.probability(from, to).unwrap_or(0.0);
                if self.rng.random::<f64>() >= probability {
                    self.losses += 1;
                    continue;
                }
                self.receptions += 1;
                let order = self.next_order;
                self.next_order += 1;
                self.queue.push(Arrival {
                    at,
                    order,
                    from,
                    to,
                    frame: frame.clone(),
                });
            }
        }
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("nodes", &self.nodes.len())
            .field("queued", &self.queue.len())
            .field("elapsed", &self.elapsed())
            .field("transmissions", &self.transmissions)
            .finish()
    }
}
