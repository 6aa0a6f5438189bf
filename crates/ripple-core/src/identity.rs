//! Node address abstractions
//!
//! This module provides the [`PeerIdentity`] trait that abstracts over the
//! network-layer address a flood node is known by:
//!
//! - `Ipv4Addr`: the address used by real deployments
//! - `SimulationIdentity`: simple char-based identity for testing ('A'..'Z')
//!
//! Link-layer addresses are always [`MacAddress`].

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::IdentityError;

/// Trait for network-layer address abstraction
///
/// This trait allows the same flooding logic to work with both simulation
/// identities (simple chars) and IPv4 addresses.
pub trait PeerIdentity:
    Clone + Eq + Hash + Send + Sync + Debug + Display + Serialize + DeserializeOwned + 'static
{
    /// Get the address as bytes (the form carried in flood headers)
    fn as_bytes(&self) -> Vec<u8>;

    /// Create an address from bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError>;

    /// Get a short display form (for logging)
    fn short_id(&self) -> String {
        format!("{}", self)
    }
}

/// Simple character-based identity for simulation
///
/// Used for testing and development. Maps to characters 'A'..'Z'.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimulationIdentity(pub char);

impl SimulationIdentity {
    /// Create a new simulation identity from a capital letter
    pub fn new(c: char) -> Option<Self> {
        if c.is_ascii_uppercase() {
            Some(Self(c))
        } else {
            None
        }
    }

    /// Generate all identities from 'A' to the given letter (inclusive)
    pub fn range_to(end: char) -> Vec<Self> {
        ('A'..=end).filter_map(Self::new).collect()
    }

    /// The first `count` identities, capped at 26
    pub fn first(count: usize) -> Vec<Self> {
        ('A'..='Z').take(count).filter_map(Self::new).collect()
    }

    /// Get the underlying character
    pub fn as_char(&self) -> char {
        self.0
    }

    /// A locally administered MAC address derived from the letter
    pub fn mac(&self) -> MacAddress {
        MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, self.0 as u8])
    }
}

impl Display for SimulationIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PeerIdentity for SimulationIdentity {
    fn as_bytes(&self) -> Vec<u8> {
        vec![self.0 as u8]
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        if bytes.len() != 1 {
            return Err(IdentityError::InvalidKeyLength {
                expected: 1,
                actual: bytes.len(),
            });
        }
        let c = bytes[0] as char;
        Self::new(c).ok_or_else(|| {
            IdentityError::InvalidFormat(format!("Invalid simulation identity: {}", c))
        })
    }

    fn short_id(&self) -> String {
        self.0.to_string()
    }
}

impl PeerIdentity for Ipv4Addr {
    fn as_bytes(&self) -> Vec<u8> {
        self.octets().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let octets: [u8; 4] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyLength {
                expected: 4,
                actual: bytes.len(),
            })?;
        Ok(Ipv4Addr::from(octets))
    }
}

/// A 48-bit link-layer address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// The all-ones broadcast address
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// Length of a MAC address on the wire
    pub const LEN: usize = 6;

    /// Create from raw octets
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Get the raw octets
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Whether this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Whether the group bit is set (broadcast included)
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl Default for MacAddress {
    fn default() -> Self {
        Self::BROADCAST
    }
}

impl Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != Self::LEN {
            return Err(IdentityError::InvalidFormat(format!(
                "Invalid MAC address: {}",
                s
            )));
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            *octet = u8::from_str_radix(part, 16).map_err(|_| {
                IdentityError::InvalidFormat(format!("Invalid MAC address: {}", s))
            })?;
        }
        Ok(Self(octets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_identity_creation() {
        assert!(SimulationIdentity::new('A').is_some());
        assert!(SimulationIdentity::new('Z').is_some());
        assert!(SimulationIdentity::new('a').is_none());
        assert!(SimulationIdentity::new('1').is_none());
    }

    #[test]
    fn test_simulation_identity_range() {
        let ids = SimulationIdentity::range_to('C');
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0].0, 'A');
        assert_eq!(ids[2].0, 'C');

        assert_eq!(SimulationIdentity::first(40).len(), 26);
    }

    #[test]
    fn test_simulation_identity_rejects_bad_bytes() {
        assert!(SimulationIdentity::from_bytes(b"ab").is_err());
        assert!(SimulationIdentity::from_bytes(b"a").is_err());
        assert_eq!(
            SimulationIdentity::from_bytes(b"Q").unwrap(),
            SimulationIdentity('Q')
        );
    }

    #[test]
    fn test_ipv4_identity() {
        let ip = Ipv4Addr::new(10, 0, 0, 7);
        assert_eq!(ip.as_bytes(), vec![10, 0, 0, 7]);
        assert_eq!(Ipv4Addr::from_bytes(&[10, 0, 0, 7]).unwrap(), ip);

        let err = Ipv4Addr::from_bytes(&[10, 0]).unwrap_err();
        assert_eq!(
            err,
            IdentityError::InvalidKeyLength {
                expected: 4,
                actual: 2
            }
        );
    }

    #[test]
    fn test_mac_address_parse_and_display() {
        let mac: MacAddress = "00:1b:21:0a:ff:03".parse().unwrap();
        assert_eq!(mac.octets(), [0x00, 0x1b, 0x21, 0x0a, 0xff, 0x03]);
        assert_eq!(mac.to_string(), "00:1b:21:0a:ff:03");
        assert!(!mac.is_multicast());

        assert!(MacAddress::BROADCAST.is_broadcast());
        assert!(MacAddress::BROADCAST.is_multicast());
        assert!("00:11:22".parse::<MacAddress>().is_err());
        assert!("zz:11:22:33:44:55".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_simulation_mac_is_unicast() {
        let mac = SimulationIdentity('B').mac();
        assert!(!mac.is_multicast());
        assert_eq!(mac.octets()[5], b'B');
    }
}
