//! Node section (`node.*`): identity, routing limits, routing timers and
//! internal queue sizes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compat::InterceptMode;
use crate::identity::{Limits, NodeId, NodeType, Phase};

/// Default point-to-point routing message interval in seconds.
const DEFAULT_T1_SECS: u64 = 600;

/// Default LAN routing message interval in seconds.
const DEFAULT_BCT1_SECS: u64 = 10;

/// Default timer wheel resolution in milliseconds.
const DEFAULT_TICK_MS: u64 = 100;

/// Default depth of the datalink event channel.
const DEFAULT_WORK_QUEUE: usize = 1024;

/// Default depth of each circuit's send queue.
const DEFAULT_SEND_QUEUE: usize = 64;

/// Default intercept relay idle timeout in seconds.
const DEFAULT_RELAY_TIMEOUT_SECS: u64 = 120;

/// Node type and protocol generation as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    L2Router,
    L1Router,
    Endnode,
    Phase3Router,
    Phase3Endnode,
    Phase2,
}

impl NodeKind {
    pub fn phase(self) -> Phase {
        match self {
            NodeKind::L2Router | NodeKind::L1Router | NodeKind::Endnode => Phase::Phase4,
            NodeKind::Phase3Router | NodeKind::Phase3Endnode => Phase::Phase3,
            NodeKind::Phase2 => Phase::Phase2,
        }
    }

    pub fn node_type(self) -> NodeType {
        match self {
            NodeKind::L2Router => NodeType::Level2Router,
            NodeKind::L1Router | NodeKind::Phase3Router => NodeType::Level1Router,
            NodeKind::Endnode | NodeKind::Phase3Endnode => NodeType::Endnode,
            NodeKind::Phase2 => NodeType::Phase2,
        }
    }
}

/// Node configuration (`node.*`).
///
/// Every field is optional so that later config files only override what
/// they mention; accessors fill in the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Node address, `area.node` or a bare node number (`node.id`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,

    /// Node name, at most 6 characters (`node.name`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Node type (`node.type`). Defaults to `l1router`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxhops: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxcost: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amaxhops: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amaxcost: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxvisits: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxnodes: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxarea: Option<u8>,

    /// Point-to-point routing message interval in seconds (`node.t1`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t1: Option<u64>,

    /// LAN routing message interval in seconds (`node.bct1`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bct1: Option<u64>,

    /// Intercept mode (`node.intercept`). Defaults by node type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intercept: Option<InterceptMode>,

    /// Timer wheel resolution in milliseconds (`node.tick_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_ms: Option<u64>,

    /// Datalink event channel depth (`node.work_queue`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_queue: Option<usize>,

    /// Per-circuit send queue depth (`node.send_queue`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_queue: Option<usize>,

    /// Intercept relay idle timeout in seconds (`node.relay_timeout`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_timeout: Option<u64>,
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        self.kind.unwrap_or(NodeKind::L1Router)
    }

    /// Routing limits, with defaults for anything not configured.
    pub fn limits(&self) -> Limits {
        let d = Limits::default();
        let mut limits = Limits {
            maxhops: self.maxhops.unwrap_or(d.maxhops),
            maxcost: self.maxcost.unwrap_or(d.maxcost),
            amaxhops: self.amaxhops.unwrap_or(d.amaxhops),
            amaxcost: self.amaxcost.unwrap_or(d.amaxcost),
            maxvisits: self.maxvisits.unwrap_or(d.maxvisits),
            maxnodes: self.maxnodes.unwrap_or(d.maxnodes),
            maxarea: self.maxarea.unwrap_or(d.maxarea),
        };
        // Phase II and III address at most 255 nodes and no areas
        if self.kind().phase() < Phase::Phase4 && self.maxnodes.is_none() {
            limits.maxnodes = crate::identity::MAX_LEGACY_NODE;
        }
        limits
    }

    pub fn t1(&self) -> Duration {
        Duration::from_secs(self.t1.unwrap_or(DEFAULT_T1_SECS))
    }

    pub fn bct1(&self) -> Duration {
        Duration::from_secs(self.bct1.unwrap_or(DEFAULT_BCT1_SECS))
    }

    /// Intercept mode; routers offer, everything else requests.
    pub fn intercept(&self) -> InterceptMode {
        self.intercept.unwrap_or(if self.kind().node_type().is_router() {
            InterceptMode::Offer
        } else {
            InterceptMode::Request
        })
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.unwrap_or(DEFAULT_TICK_MS).max(1))
    }

    pub fn work_queue(&self) -> usize {
        self.work_queue.unwrap_or(DEFAULT_WORK_QUEUE).max(1)
    }

    pub fn send_queue(&self) -> usize {
        self.send_queue.unwrap_or(DEFAULT_SEND_QUEUE).max(1)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout.unwrap_or(DEFAULT_RELAY_TIMEOUT_SECS))
    }

    /// Override fields that are set in `other`.
    pub fn merge(&mut self, other: NodeConfig) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            id, name, kind, maxhops, maxcost, amaxhops, amaxcost, maxvisits, maxnodes, maxarea,
            t1, bct1, intercept, tick_ms, work_queue, send_queue, relay_timeout
        );
    }
}
