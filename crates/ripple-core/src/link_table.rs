//! In-memory collaborator tables
//!
//! [`LinkTable`] stores directed link delivery probabilities and implements
//! [`LinkQualityOracle`]; [`ArpTable`] stores address bindings and implements
//! [`AddressResolver`]. Both are shared between the flood node and whatever
//! populates them, so they use interior mutability.

use std::collections::HashMap;
use std::sync::RwLock;

use dashmap::DashMap;

use crate::identity::{MacAddress, PeerIdentity};
use crate::traits::{AddressResolver, LinkQualityOracle};

/// Directed link probabilities, keyed by sender
///
/// Outgoing links keep the order they were first set in, so neighbor lists
/// come back in a stable order.
#[derive(Debug)]
pub struct LinkTable<I: PeerIdentity> {
    links: RwLock<HashMap<I, Vec<(I, f64)>>>,
}

impl<I: PeerIdentity> LinkTable<I> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            links: RwLock::new(HashMap::new()),
        }
    }

    /// Set the probability for `from -> to`
    pub fn set_link(&self, from: I, to: I, probability: f64) {
        if from == to {
            return;
        }
        let probability = probability.clamp(0.0, 1.0);
        let mut links = self.links.write().unwrap_or_else(|e| e.into_inner());
        let out = links.entry(from).or_default();
        match out.iter_mut().find(|(id, _)| *id == to) {
            Some(link) => link.1 = probability,
            None => out.push((to, probability)),
        }
    }

    /// Set the same probability in both directions
    pub fn set_symmetric(&self, a: I, b: I, probability: f64) {
        self.set_link(a.clone(), b.clone(), probability);
        self.set_link(b, a, probability);
    }

    /// Remove the link `from -> to`
    pub fn remove_link(&self, from: &I, to: &I) {
        if let Some(out) = self
            .links
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(from)
        {
            out.retain(|(id, _)| id != to);
        }
    }

    /// Number of directed links
    pub fn link_count(&self) -> usize {
        self.links
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|out| out.len())
            .sum()
    }

    /// Drop every link
    pub fn clear(&self) {
        self.links.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl<I: PeerIdentity> Default for LinkTable<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: PeerIdentity> LinkQualityOracle<I> for LinkTable<I> {
    fn neighbors(&self, node: &I) -> Vec<I> {
        self.links
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(node)
            .map(|out| out.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }

    fn link_probability(&self, from: &I, to: &I) -> Option<f64> {
        self.links
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(from)
            .and_then(|out| out.iter().find(|(id, _)| id == to))
            .map(|(_, p)| *p)
    }
}

/// Network address to link address bindings
#[derive(Debug)]
pub struct ArpTable<I: PeerIdentity> {
    entries: DashMap<I, MacAddress>,
}

impl<I: PeerIdentity> ArpTable<I> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Create a table with a static binding already present
    pub fn with_binding(address: I, mac: MacAddress) -> Self {
        let table = Self::new();
        table.entries.insert(address, mac);
        table
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<I: PeerIdentity> Default for ArpTable<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: PeerIdentity> AddressResolver<I> for ArpTable<I> {
    fn lookup(&self, address: &I) -> Option<MacAddress> {
        self.entries.get(address).map(|entry| *entry)
    }

    fn learn(&self, address: &I, mac: MacAddress) {
        self.entries.insert(address.clone(), mac);
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::error::IdentityError;
    use crate::identity::SimulationIdentity;

    fn id(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    /// Identity whose short form keeps only the first two characters
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    struct Hostname(String);

    impl fmt::Display for Hostname {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl PeerIdentity for Hostname {
        fn as_bytes(&self) -> Vec<u8> {
            self.0.as_bytes().to_vec()
        }

        fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
            String::from_utf8(bytes.to_vec())
                .map(Hostname)
                .map_err(|e| IdentityError::InvalidFormat(e.to_string()))
        }

        fn short_id(&self) -> String {
            self.0.chars().take(2).collect()
        }
    }

    fn host(name: &str) -> Hostname {
        Hostname(name.to_string())
    }

    #[test]
    fn test_link_table_directed() {
        let table = LinkTable::new();
        table.set_link(id('A'), id('B'), 0.9);

        assert_eq!(table.link_probability(&id('A'), &id('B')), Some(0.9));
        assert_eq!(table.link_probability(&id('B'), &id('A')), None);
        assert_eq!(table.neighbors(&id('A')), vec![id('B')]);
        assert!(table.neighbors(&id('B')).is_empty());
    }

    #[test]
    fn test_link_table_symmetric_and_clamped() {
        let table = LinkTable::new();
        table.set_symmetric(id('A'), id('B'), 1.7);
        table.set_symmetric(id('A'), id('C'), 0.4);

        assert_eq!(table.link_probability(&id('B'), &id('A')), Some(1.0));
        assert_eq!(table.link_count(), 4);
        assert_eq!(table.neighbors(&id('A')), vec![id('B'), id('C')]);
        assert_eq!(table.neighbor_weight(&id('A')), 2.0);
    }

    #[test]
    fn test_link_table_keeps_receivers_sharing_a_short_id() {
        let table = LinkTable::new();
        table.set_link(host("gateway"), host("node-1"), 0.9);
        table.set_link(host("gateway"), host("node-2"), 0.3);
        assert_eq!(host("node-1").short_id(), host("node-2").short_id());

        assert_eq!(table.link_count(), 2);
        assert_eq!(table.neighbors(&host("gateway")), vec![host("node-1"), host("node-2")]);
        assert_eq!(table.link_probability(&host("gateway"), &host("node-1")), Some(0.9));
        assert_eq!(table.link_probability(&host("gateway"), &host("node-2")), Some(0.3));

        table.remove_link(&host("gateway"), &host("node-1"));
        assert_eq!(table.neighbors(&host("gateway")), vec![host("node-2")]);
    }

    #[test]
    fn test_link_table_update_keeps_position() {
        let table = LinkTable::new();
        table.set_link(id('A'), id('C'), 0.2);
        table.set_link(id('A'), id('B'), 0.4);
        table.set_link(id('A'), id('C'), 0.7);

        assert_eq!(table.link_count(), 2);
        assert_eq!(table.neighbors(&id('A')), vec![id('C'), id('B')]);
        assert_eq!(table.link_probability(&id('A'), &id('C')), Some(0.7));
    }

    #[test]
    fn test_link_table_ignores_self_links() {
        let table = LinkTable::new();
        table.set_link(id('A'), id('A'), 1.0);
        assert_eq!(table.link_count(), 0);
    }

    #[test]
    fn test_link_table_remove() {
        let table = LinkTable::new();
        table.set_symmetric(id('A'), id('B'), 0.5);
        table.remove_link(&id('A'), &id('B'));

        assert_eq!(table.link_probability(&id('A'), &id('B')), None);
        assert_eq!(table.link_probability(&id('B'), &id('A')), Some(0.5));
    }

    #[test]
    fn test_arp_table_learn_and_lookup() {
        let table = ArpTable::new();
        assert!(table.lookup(&id('A')).is_none());

        table.learn(&id('A'), id('A').mac());
        assert_eq!(table.lookup(&id('A')), Some(id('A').mac()));
        assert_eq!(table.len(), 1);

        let seeded = ArpTable::with_binding(id('Z'), MacAddress::BROADCAST);
        assert_eq!(seeded.lookup(&id('Z')), Some(MacAddress::BROADCAST));
    }
}
