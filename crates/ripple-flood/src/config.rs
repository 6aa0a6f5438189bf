//! Configuration for a flood node
//!
//! [`FloodConfig`] carries the node's addresses and the suppression
//! threshold, which have no sensible defaults and must be supplied through
//! [`FloodConfigBuilder`]. Everything else lives in [`FloodSettings`], which
//! is serde-friendly so it can be loaded from a file.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ripple_core::{MacAddress, PeerIdentity};

use crate::error::ConfigError;

/// Default upper bound on forwarding jitter
pub const DEFAULT_MAX_DELAY_MS: u64 = 750;

/// Default number of sequence numbers to remember
pub const DEFAULT_HISTORY: usize = 100;

/// Default probability above which a neighbor is considered covered
pub const DEFAULT_MIN_P: f64 = 0.9;

/// Default slot width when slot picking is enabled
pub const DEFAULT_SLOT_TIME_MS: u64 = 15;

/// Largest accepted `max_delay_ms`
pub const MAX_DELAY_LIMIT_MS: u64 = 3_600_000;

/// What happens to a still-pending broadcast when it falls out of history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Cancel the timer and never forward
    #[default]
    Drop,
    /// Run the forwarding decision immediately, then discard
    ForceForward,
}

/// Tunable flood behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodSettings {
    /// Upper bound on the delay before forwarding (ms)
    pub max_delay_ms: u64,
    /// Verbose per-packet logging
    pub debug: bool,
    /// Number of broadcasts (and probability records) to retain
    pub history: usize,
    /// Probability at or above which a neighbor is believed to have a packet
    pub min_p: f64,
    /// Use link probabilities; when false every known link counts as perfect
    pub lossy: bool,
    /// Quantize delays into slots ordered by marginal value
    pub pick_slots: bool,
    /// Weight slot choice by expected additional receivers
    pub slots_erx: bool,
    /// Weight slot choice by neighbor weight
    pub slots_nweight: bool,
    /// Slot width (ms)
    pub slot_time_ms: u64,
    /// Upper bound on the delay before sending an originated packet (ms)
    pub origin_jitter_ms: u64,
    /// Suppress as soon as the threshold is reached instead of at fire time
    pub early_suppress: bool,
    /// Treatment of pending broadcasts evicted from history
    pub eviction: EvictionPolicy,
    /// First sequence number used for originated packets (random if unset)
    pub first_sequence: Option<u32>,
    /// Seed for the jitter generator (OS entropy if unset)
    pub rng_seed: Option<u64>,
}

impl Default for FloodSettings {
    fn default() -> Self {
        Self {
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            debug: false,
            history: DEFAULT_HISTORY,
            min_p: DEFAULT_MIN_P,
            lossy: true,
            pick_slots: false,
            slots_erx: false,
            slots_nweight: false,
            slot_time_ms: DEFAULT_SLOT_TIME_MS,
            origin_jitter_ms: 0,
            early_suppress: false,
            eviction: EvictionPolicy::Drop,
            first_sequence: None,
            rng_seed: None,
        }
    }
}

impl FloodSettings {
    /// Slotted forwarding weighted by both coverage and neighbor weight
    pub fn slotted() -> Self {
        Self {
            pick_slots: true,
            slots_erx: true,
            slots_nweight: true,
            ..Self::default()
        }
    }

    /// Short jitter window for small, well-connected meshes
    pub fn low_latency() -> Self {
        Self {
            max_delay_ms: 100,
            slot_time_ms: 10,
            history: 50,
            ..Self::default()
        }
    }

    /// Cancel pending forwards as soon as enough copies are overheard
    pub fn quiet() -> Self {
        Self {
            early_suppress: true,
            min_p: 0.8,
            ..Self::default()
        }
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn slot_time(&self) -> Duration {
        Duration::from_millis(self.slot_time_ms)
    }

    pub fn origin_jitter(&self) -> Duration {
        Duration::from_millis(self.origin_jitter_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.history == 0 {
            return Err(ConfigError::invalid("HISTORY", "must be at least 1"));
        }
        if self.max_delay_ms > MAX_DELAY_LIMIT_MS {
            return Err(ConfigError::invalid(
                "MAX_DELAY",
                format!("{} ms exceeds {} ms", self.max_delay_ms, MAX_DELAY_LIMIT_MS),
            ));
        }
        validate_min_p(self.min_p)?;
        if self.pick_slots {
            if self.slot_time_ms == 0 {
                return Err(ConfigError::invalid("slot_time_ms", "must be positive"));
            }
            if self.slot_time_ms > self.max_delay_ms {
                return Err(ConfigError::invalid(
                    "slot_time_ms",
                    "must not exceed MAX_DELAY",
                ));
            }
        }
        if self.origin_jitter_ms > self.max_delay_ms {
            return Err(ConfigError::invalid(
                "origin_jitter_ms",
                "must not exceed MAX_DELAY",
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_min_p(min_p: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&min_p) {
        return Err(ConfigError::invalid(
            "min_p",
            format!("{} is not a probability", min_p),
        ));
    }
    Ok(())
}

/// Complete configuration for one flood node
#[derive(Debug, Clone)]
pub struct FloodConfig<I: PeerIdentity> {
    /// Ethertype of outgoing and accepted frames
    pub ethertype: u16,
    /// This node's network address
    pub ip: I,
    /// Network broadcast address
    pub bcast_ip: I,
    /// This node's link address
    pub eth: MacAddress,
    /// Link broadcast address
    pub bcast_eth: MacAddress,
    /// Suppression threshold: do not forward once this many copies were received
    ///
    /// 0 always forwards; 1 never relays, only originates.
    pub count: u32,
    /// Tunables
    pub settings: FloodSettings,
}

impl<I: PeerIdentity> FloodConfig<I> {
    /// Start building a configuration
    pub fn builder() -> FloodConfigBuilder<I> {
        FloodConfigBuilder::new()
    }

    /// Check every option, returning the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ethertype < 0x0600 {
            return Err(ConfigError::invalid(
                "ETHTYPE",
                format!("0x{:04x} is a length, not an ethertype", self.ethertype),
            ));
        }
        if self.ip == self.bcast_ip {
            return Err(ConfigError::invalid("BCAST_IP", "must differ from IP"));
        }
        if self.eth.is_multicast() {
            return Err(ConfigError::invalid(
                "ETH",
                format!("{} is not a unicast address", self.eth),
            ));
        }
        self.settings.validate()
    }

    /// Non-fatal observations about the configuration
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.count == 1 {
            warnings.push(ConfigWarning::LocalBroadcastOnly);
        }
        if self.settings.max_delay_ms == 0 {
            warnings.push(ConfigWarning::NoJitter);
        }
        if self.settings.history > 10_000 {
            warnings.push(ConfigWarning::LargeHistory);
        }
        if !self.settings.pick_slots && (self.settings.slots_erx || self.settings.slots_nweight) {
            warnings.push(ConfigWarning::SlotWeightsIgnored);
        }

        warnings
    }
}

/// Builder for [`FloodConfig`]
#[derive(Debug, Clone)]
pub struct FloodConfigBuilder<I: PeerIdentity> {
    ethertype: Option<u16>,
    ip: Option<I>,
    bcast_ip: Option<I>,
    eth: Option<MacAddress>,
    bcast_eth: MacAddress,
    count: Option<u32>,
    settings: FloodSettings,
}

impl<I: PeerIdentity> FloodConfigBuilder<I> {
    pub fn new() -> Self {
        Self {
            ethertype: None,
            ip: None,
            bcast_ip: None,
            eth: None,
            bcast_eth: MacAddress::BROADCAST,
            count: None,
            settings: FloodSettings::default(),
        }
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = Some(ethertype);
        self
    }

    pub fn ip(mut self, ip: I) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn bcast_ip(mut self, bcast_ip: I) -> Self {
        self.bcast_ip = Some(bcast_ip);
        self
    }

    pub fn eth(mut self, eth: MacAddress) -> Self {
        self.eth = Some(eth);
        self
    }

    pub fn bcast_eth(mut self, bcast_eth: MacAddress) -> Self {
        self.bcast_eth = bcast_eth;
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.settings.max_delay_ms = max_delay_ms;
        self
    }

    pub fn history(mut self, history: usize) -> Self {
        self.settings.history = history;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.settings.debug = debug;
        self
    }

    /// Replace all tunables at once
    pub fn settings(mut self, settings: FloodSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Assemble and validate
    pub fn build(self) -> Result<FloodConfig<I>, ConfigError> {
        let config = FloodConfig {
            ethertype: self.ethertype.ok_or(ConfigError::MissingField("ETHTYPE"))?,
            ip: self.ip.ok_or(ConfigError::MissingField("IP"))?,
            bcast_ip: self.bcast_ip.ok_or(ConfigError::MissingField("BCAST_IP"))?,
            eth: self.eth.ok_or(ConfigError::MissingField("ETH"))?,
            bcast_eth: self.bcast_eth,
            count: self.count.ok_or(ConfigError::MissingField("COUNT"))?,
            settings: self.settings,
        };
        config.validate()?;
        Ok(config)
    }
}

impl<I: PeerIdentity> Default for FloodConfigBuilder<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// COUNT = 1: received packets are never relayed
    LocalBroadcastOnly,
    /// MAX_DELAY = 0: forwards are not jittered
    NoJitter,
    /// HISTORY is very large (> 10000)
    LargeHistory,
    /// Slot weighting flags are set but slot picking is off
    SlotWeightsIgnored,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::LocalBroadcastOnly => {
                write!(f, "COUNT is 1; received broadcasts will never be relayed")
            }
            ConfigWarning::NoJitter => write!(f, "MAX_DELAY is 0; forwards are not jittered"),
            ConfigWarning::LargeHistory => write!(f, "HISTORY is very large (> 10000)"),
            ConfigWarning::SlotWeightsIgnored => {
                write!(f, "slots_erx/slots_nweight have no effect without pick_slots")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn base() -> FloodConfigBuilder<Ipv4Addr> {
        FloodConfig::builder()
            .ethertype(0x0941)
            .ip(Ipv4Addr::new(10, 0, 0, 1))
            .bcast_ip(Ipv4Addr::new(10, 255, 255, 255))
            .eth(MacAddress([0x02, 0, 0, 0, 0, 1]))
            .count(2)
    }

    #[test]
    fn test_defaults() {
        let config = base().build().unwrap();
        assert_eq!(config.settings.max_delay_ms, 750);
        assert_eq!(config.settings.history, 100);
        assert!(!config.settings.debug);
        assert_eq!(config.bcast_eth, MacAddress::BROADCAST);
        assert_eq!(config.settings.eviction, EvictionPolicy::Drop);
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn test_missing_fields() {
        let err = FloodConfigBuilder::<Ipv4Addr>::new().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingField("ETHTYPE"));

        let err = FloodConfig::<Ipv4Addr>::builder()
            .ethertype(0x0941)
            .ip(Ipv4Addr::new(10, 0, 0, 1))
            .bcast_ip(Ipv4Addr::new(10, 255, 255, 255))
            .eth(MacAddress([0x02, 0, 0, 0, 0, 1]))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingField("COUNT"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            base().ethertype(0x0100).build(),
            Err(ConfigError::InvalidField { field: "ETHTYPE", .. })
        ));
        assert!(matches!(
            base().bcast_ip(Ipv4Addr::new(10, 0, 0, 1)).build(),
            Err(ConfigError::InvalidField { field: "BCAST_IP", .. })
        ));
        assert!(matches!(
            base().eth(MacAddress::BROADCAST).build(),
            Err(ConfigError::InvalidField { field: "ETH", .. })
        ));
        assert!(matches!(
            base().history(0).build(),
            Err(ConfigError::InvalidField { field: "HISTORY", .. })
        ));
        assert!(matches!(
            base().max_delay_ms(MAX_DELAY_LIMIT_MS + 1).build(),
            Err(ConfigError::InvalidField { field: "MAX_DELAY", .. })
        ));
    }

    #[test]
    fn test_invalid_settings() {
        let settings = FloodSettings {
            min_p: 1.5,
            ..FloodSettings::default()
        };
        assert!(matches!(
            base().settings(settings).build(),
            Err(ConfigError::InvalidField { field: "min_p", .. })
        ));

        let settings = FloodSettings {
            pick_slots: true,
            slot_time_ms: 0,
            ..FloodSettings::default()
        };
        assert!(base().settings(settings).build().is_err());

        let settings = FloodSettings {
            pick_slots: true,
            slot_time_ms: 1000,
            ..FloodSettings::default()
        };
        assert!(base().settings(settings).build().is_err());

        let settings = FloodSettings {
            origin_jitter_ms: 800,
            ..FloodSettings::default()
        };
        assert!(base().settings(settings).build().is_err());
    }

    #[test]
    fn test_presets_are_valid() {
        for settings in [
            FloodSettings::default(),
            FloodSettings::slotted(),
            FloodSettings::low_latency(),
            FloodSettings::quiet(),
        ] {
            assert!(base().settings(settings).build().is_ok());
        }
    }

    #[test]
    fn test_warnings() {
        let config = base().count(1).max_delay_ms(0).build().unwrap();
        let warnings = config.warnings();
        assert!(warnings.contains(&ConfigWarning::LocalBroadcastOnly));
        assert!(warnings.contains(&ConfigWarning::NoJitter));

        let settings = FloodSettings {
            slots_erx: true,
            ..FloodSettings::default()
        };
        let config = base().settings(settings).build().unwrap();
        assert_eq!(config.warnings(), vec![ConfigWarning::SlotWeightsIgnored]);
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: FloodSettings =
            serde_json::from_str(r#"{"max_delay_ms": 300, "eviction": "force_forward"}"#).unwrap();
        assert_eq!(settings.max_delay_ms, 300);
        assert_eq!(settings.eviction, EvictionPolicy::ForceForward);
        assert_eq!(settings.history, DEFAULT_HISTORY);
        assert_eq!(settings.max_delay(), Duration::from_millis(300));
    }
}
