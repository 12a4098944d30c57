//! Identity and static limits of the local node.

use std::fmt;

use super::{validate_node_name, IdentityError, MacAddr, NodeId, NodeType, Phase, Version};
use super::{MAX_AREA, MAX_LEGACY_NODE, MAX_NODE};

/// Routing limits of the local node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Maximum hops for level 1 routes.
    pub maxhops: u8,
    /// Maximum cost for level 1 routes.
    pub maxcost: u16,
    /// Maximum hops for level 2 (area) routes.
    pub amaxhops: u8,
    /// Maximum cost for level 2 (area) routes.
    pub amaxcost: u16,
    /// Maximum router traversals for a data packet.
    pub maxvisits: u8,
    /// Highest node number in the level 1 table.
    pub maxnodes: u16,
    /// Highest area number in the level 2 table.
    pub maxarea: u8,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            maxhops: 16,
            maxcost: 128,
            amaxhops: 16,
            amaxcost: 128,
            maxvisits: 32,
            maxnodes: MAX_NODE,
            maxarea: MAX_AREA,
        }
    }
}

/// The local node's identity. Immutable after startup.
#[derive(Clone)]
pub struct LocalNode {
    id: NodeId,
    name: String,
    phase: Phase,
    node_type: NodeType,
    limits: Limits,
}

impl LocalNode {
    /// Create the local identity, checking type and address against the phase.
    pub fn new(
        id: NodeId,
        name: &str,
        phase: Phase,
        node_type: NodeType,
        limits: Limits,
    ) -> Result<Self, IdentityError> {
        validate_node_name(name)?;
        if !node_type.valid_in(phase) {
            return Err(IdentityError::TypeNotInPhase { node_type, phase });
        }
        let id_ok = match phase {
            Phase::Phase4 => id.area() >= 1 && id.node() >= 1,
            Phase::Phase2 | Phase::Phase3 => {
                id.area() == 0 && id.node() >= 1 && id.node() <= MAX_LEGACY_NODE
            }
        };
        if !id_ok || id.node() > limits.maxnodes || id.area() > limits.maxarea {
            return Err(IdentityError::AddressNotInPhase { id, phase });
        }
        Ok(Self {
            id,
            name: name.to_ascii_uppercase(),
            phase,
            node_type,
            limits,
        })
    }

    /// This node's address.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// This node's name (upper case).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operating phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Node type.
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Routing limits.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Home area (0 for Phase II and III nodes).
    pub fn area(&self) -> u8 {
        self.id.area()
    }

    /// True if this node forwards traffic for others.
    pub fn is_router(&self) -> bool {
        self.node_type.is_router()
    }

    /// True if this node routes between areas.
    pub fn is_area_router(&self) -> bool {
        self.node_type == NodeType::Level2Router
    }

    /// Routing layer version announced by this node.
    pub fn version(&self) -> Version {
        self.phase.version()
    }

    /// The address to put in packets sent to a neighbor of `neighbor_phase`.
    pub fn wire_id(&self, neighbor_phase: Phase) -> NodeId {
        if neighbor_phase < Phase::Phase4 {
            self.id.without_area()
        } else {
            self.id
        }
    }

    /// Station address on LAN circuits.
    pub fn station(&self) -> MacAddr {
        MacAddr::from_node(self.id)
    }

    /// Interpret an address received from a neighbor of `neighbor_phase`.
    ///
    /// Legacy neighbors send bare node numbers which belong to our area.
    pub fn localize(&self, id: NodeId, neighbor_phase: Phase) -> NodeId {
        if neighbor_phase < Phase::Phase4 || id.area() == 0 {
            id.with_area(self.area())
        } else {
            id
        }
    }
}

impl fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("node_type", &self.node_type)
            .finish()
    }
}
