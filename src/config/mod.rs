//! DECnet Configuration System
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./decnet.yaml` (current directory - highest priority)
//! 2. `~/.decnet.yaml`
//! 3. `~/.config/decnet/decnet.yaml` (user config directory)
//! 4. `/etc/decnet/decnet.yaml` (system - lowest priority)
//!
//! Values from higher priority files override those from lower priority files.
//!
//! # YAML Structure
//!
//! ```yaml
//! node:
//!   id: "1.5"
//!   name: ALPHA
//!   type: l2router
//! circuits:
//!   - name: ptp-0
//!     kind: ptp
//!     cost: 4
//!     udp:
//!       bind: "0.0.0.0:7001"
//!       peers: ["192.0.2.7:7001"]
//! nodes:
//!   - id: "1.7"
//!     name: BETA
//!     outbound_verification: secret
//! ```

mod circuit;
mod node;
mod nodes;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compat::InterceptMode;
use crate::identity::{IdentityError, LocalNode, NodeDb, NodeId, Phase};

pub use circuit::{CircuitConfig, CircuitKind, UdpLinkConfig};
pub use node::{NodeConfig, NodeKind};
pub use nodes::NodeEntry;

/// Default config filename.
const CONFIG_FILENAME: &str = "decnet.yaml";

/// Highest configurable circuit cost.
const MAX_CIRCUIT_COST: u8 = 25;

/// Highest router priority.
const MAX_PRIORITY: u8 = 127;

/// Highest number of routers on a LAN.
const MAX_NR: u8 = 33;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Node configuration (`node.*`).
    #[serde(default)]
    pub node: NodeConfig,

    /// Circuits (`circuits`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub circuits: Vec<CircuitConfig>,

    /// Node database (`nodes`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeEntry>,
}

impl Config {
    /// Create a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Returns a tuple of (config, paths_loaded) where paths_loaded contains
    /// the paths that were successfully loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load configuration from specific paths.
    ///
    /// Paths are processed in order, with later paths overriding earlier ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let file_config = Self::load_file(path)?;
                config.merge(file_config);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System config (lowest priority)
        paths.push(PathBuf::from("/etc/decnet").join(CONFIG_FILENAME));

        // User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("decnet").join(CONFIG_FILENAME));
        }

        // Home directory
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".decnet.yaml"));
        }

        // Current directory (highest priority)
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Merge another configuration into this one.
    ///
    /// Node fields set in `other` override ours; circuit and node lists
    /// are replaced as a whole when `other` has any.
    pub fn merge(&mut self, other: Config) {
        self.node.merge(other.node);
        if !other.circuits.is_empty() {
            self.circuits = other.circuits;
        }
        if !other.nodes.is_empty() {
            self.nodes = other.nodes;
        }
    }

    /// Reject contradictory or out of range settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let local = self.local_node()?;
        let phase = local.phase();
        let limits = local.limits();

        if limits.maxhops == 0 || limits.maxhops >= crate::protocol::INFINITE_HOPS {
            return Err(invalid(format!("maxhops {} out of range", limits.maxhops)));
        }
        if limits.maxcost == 0 || limits.maxcost >= crate::protocol::INFINITE_COST {
            return Err(invalid(format!("maxcost {} out of range", limits.maxcost)));
        }
        if limits.amaxhops == 0 || limits.amaxhops >= crate::protocol::INFINITE_HOPS {
            return Err(invalid(format!("amaxhops {} out of range", limits.amaxhops)));
        }
        if limits.amaxcost == 0 || limits.amaxcost >= crate::protocol::INFINITE_COST {
            return Err(invalid(format!("amaxcost {} out of range", limits.amaxcost)));
        }
        if limits.maxvisits < limits.maxhops || limits.maxvisits > crate::protocol::MAX_SHORT_VISIT {
            return Err(invalid(format!("maxvisits {} out of range", limits.maxvisits)));
        }
        if phase < Phase::Phase4 && limits.maxnodes > crate::identity::MAX_LEGACY_NODE {
            return Err(invalid(format!(
                "maxnodes {} exceeds what {} can address",
                limits.maxnodes, phase
            )));
        }
        if self.node.intercept() == InterceptMode::Offer && !local.is_router() {
            return Err(invalid("intercept offer requires a router".to_string()));
        }

        let mut names = HashSet::new();
        for circuit in &self.circuits {
            if circuit.name.is_empty() {
                return Err(invalid("circuit with empty name".to_string()));
            }
            if !names.insert(circuit.name.as_str()) {
                return Err(invalid(format!("duplicate circuit '{}'", circuit.name)));
            }
            let cost = circuit.cost();
            if cost == 0 || cost > MAX_CIRCUIT_COST {
                return Err(invalid(format!("circuit {}: cost {} out of range", circuit.name, cost)));
            }
            if circuit.priority() > MAX_PRIORITY {
                return Err(invalid(format!(
                    "circuit {}: priority {} out of range",
                    circuit.name,
                    circuit.priority()
                )));
            }
            if circuit.nr() > MAX_NR {
                return Err(invalid(format!("circuit {}: nr {} out of range", circuit.name, circuit.nr())));
            }
            match circuit.kind {
                CircuitKind::Lan if phase < Phase::Phase4 => {
                    return Err(invalid(format!(
                        "circuit {}: LAN circuits need a Phase IV node",
                        circuit.name
                    )));
                }
                CircuitKind::Ptp if circuit.udp.peers.len() > 1 => {
                    return Err(invalid(format!(
                        "circuit {}: point-to-point circuits have one peer",
                        circuit.name
                    )));
                }
                _ => {}
            }
        }

        let max_verification = if phase == Phase::Phase2 { 8 } else { 64 };
        for entry in &self.nodes {
            entry.check_verification(max_verification)?;
        }
        self.node_db()?;
        Ok(())
    }

    /// The local node identity described by the `node` section.
    pub fn local_node(&self) -> Result<LocalNode, ConfigError> {
        let id: NodeId = self
            .node
            .id
            .ok_or_else(|| invalid("node.id is required".to_string()))?;
        let name = self
            .node
            .name
            .as_deref()
            .ok_or_else(|| invalid("node.name is required".to_string()))?;
        let kind = self.node.kind();
        Ok(LocalNode::new(
            id,
            name,
            kind.phase(),
            kind.node_type(),
            self.node.limits(),
        )?)
    }

    /// The node database described by the `nodes` section.
    pub fn node_db(&self) -> Result<NodeDb, ConfigError> {
        nodes::build_node_db(&self.nodes)
    }

    /// Serialize this configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::Invalid(msg)
}
