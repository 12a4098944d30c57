//! Node types, protocol phases and routing layer versions.

use std::fmt;

/// Node type as carried in Init and Hello messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    /// Phase II node (no routing capability of its own).
    Phase2,
    /// Level 2 (area) router.
    Level2Router,
    /// Level 1 router.
    Level1Router,
    /// Non-routing endnode.
    Endnode,
}

impl NodeType {
    /// Decode the 2-bit wire code.
    pub fn from_wire(code: u8) -> Option<Self> {
        match code {
            0 => Some(NodeType::Phase2),
            1 => Some(NodeType::Level2Router),
            2 => Some(NodeType::Level1Router),
            3 => Some(NodeType::Endnode),
            _ => None,
        }
    }

    /// Encode as the 2-bit wire code.
    pub fn to_wire(self) -> u8 {
        match self {
            NodeType::Phase2 => 0,
            NodeType::Level2Router => 1,
            NodeType::Level1Router => 2,
            NodeType::Endnode => 3,
        }
    }

    /// True for level 1 and level 2 routers.
    pub fn is_router(self) -> bool {
        matches!(self, NodeType::Level1Router | NodeType::Level2Router)
    }

    /// Whether this type is legal for a node running `phase`.
    pub fn valid_in(self, phase: Phase) -> bool {
        match phase {
            Phase::Phase2 => self == NodeType::Phase2,
            Phase::Phase3 => matches!(self, NodeType::Level1Router | NodeType::Endnode),
            Phase::Phase4 => self != NodeType::Phase2,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Phase2 => "phase2",
            NodeType::Level2Router => "area-router",
            NodeType::Level1Router => "l1-router",
            NodeType::Endnode => "endnode",
        };
        write!(f, "{}", s)
    }
}

/// Protocol generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Phase2,
    Phase3,
    Phase4,
}

impl Phase {
    /// Routing layer version this phase announces.
    pub fn version(self) -> Version {
        match self {
            Phase::Phase2 => Version::PHASE2,
            Phase::Phase3 => Version::PHASE3,
            Phase::Phase4 => Version::PHASE4,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Phase2 => "Phase II",
            Phase::Phase3 => "Phase III",
            Phase::Phase4 => "Phase IV",
        };
        write!(f, "{}", s)
    }
}

/// Three-byte version triple (version, ECO, user ECO).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub major: u8,
    pub eco: u8,
    pub user_eco: u8,
}

impl Version {
    pub const PHASE2: Version = Version::new(0, 0, 0);
    pub const PHASE3: Version = Version::new(1, 3, 0);
    pub const PHASE4: Version = Version::new(2, 0, 0);

    /// Create a version triple.
    pub const fn new(major: u8, eco: u8, user_eco: u8) -> Self {
        Self { major, eco, user_eco }
    }

    /// Map a routing layer version onto its phase.
    ///
    /// Only the major number matters; unknown majors yield `None`.
    pub fn phase(&self) -> Option<Phase> {
        match self.major {
            0 => Some(Phase::Phase2),
            1 => Some(Phase::Phase3),
            2 => Some(Phase::Phase4),
            _ => None,
        }
    }

    /// Wire encoding.
    pub fn to_bytes(self) -> [u8; 3] {
        [self.major, self.eco, self.user_eco]
    }

    /// Decode from wire bytes.
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.eco, self.user_eco)
    }
}
