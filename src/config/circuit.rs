//! Circuit configuration (`circuits[]`) and the UDP datalink settings each
//! circuit carries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default circuit cost.
const DEFAULT_COST: u8 = 1;

/// Default LAN hello interval in seconds.
const DEFAULT_LAN_T3_SECS: u64 = 10;

/// Default point-to-point hello interval in seconds.
const DEFAULT_PTP_T3_SECS: u64 = 60;

/// Default router priority.
const DEFAULT_PRIORITY: u8 = 64;

/// Default maximum number of routers on a LAN.
const DEFAULT_NR: u8 = 10;

/// Default point-to-point block size.
const DEFAULT_PTP_BLKSIZE: u16 = 576;

/// Default LAN block size.
const DEFAULT_LAN_BLKSIZE: u16 = 1498;

/// Default UDP bind address.
const DEFAULT_UDP_BIND: &str = "0.0.0.0:0";

/// Point-to-point or broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitKind {
    Ptp,
    Lan,
}

impl std::fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitKind::Ptp => "ptp",
            CircuitKind::Lan => "lan",
        };
        write!(f, "{}", s)
    }
}

/// UDP datalink for one circuit (`circuits[].udp`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UdpLinkConfig {
    /// Local socket address (`bind`). Defaults to "0.0.0.0:0".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Remote socket addresses (`peers`). Exactly one on point-to-point
    /// circuits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<String>,
}

impl UdpLinkConfig {
    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_UDP_BIND)
    }
}

/// One circuit (`circuits[]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitConfig {
    /// Circuit name, unique on this node.
    pub name: String,

    pub kind: CircuitKind,

    /// Routing cost, 1..25 (`cost`). Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<u8>,

    /// Hello interval in seconds (`t3`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t3: Option<u64>,

    /// Router priority on LAN circuits, 0..127 (`priority`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,

    /// Maximum routers on a LAN circuit, 0..33 (`nr`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nr: Option<u8>,

    /// Require the neighbor to verify itself (`verify`).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub verify: bool,

    /// Start the circuit at startup (`enabled`). Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Datalink block size (`blksize`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blksize: Option<u16>,

    #[serde(default)]
    pub udp: UdpLinkConfig,
}

impl CircuitConfig {
    /// A circuit with every optional field left at its default.
    pub fn new(name: &str, kind: CircuitKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            cost: None,
            t3: None,
            priority: None,
            nr: None,
            verify: false,
            enabled: None,
            blksize: None,
            udp: UdpLinkConfig::default(),
        }
    }

    pub fn cost(&self) -> u8 {
        self.cost.unwrap_or(DEFAULT_COST)
    }

    pub fn t3(&self) -> Duration {
        let secs = self.t3.unwrap_or(match self.kind {
            CircuitKind::Lan => DEFAULT_LAN_T3_SECS,
            CircuitKind::Ptp => DEFAULT_PTP_T3_SECS,
        });
        Duration::from_secs(secs.max(1))
    }

    pub fn priority(&self) -> u8 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }

    pub fn nr(&self) -> u8 {
        self.nr.unwrap_or(DEFAULT_NR)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn blksize(&self) -> u16 {
        self.blksize.unwrap_or(match self.kind {
            CircuitKind::Lan => DEFAULT_LAN_BLKSIZE,
            CircuitKind::Ptp => DEFAULT_PTP_BLKSIZE,
        })
    }
}
