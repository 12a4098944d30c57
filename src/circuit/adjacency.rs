//! Neighbor relationships over a circuit.

use std::fmt;
use std::time::Duration;

use super::CircuitId;
use crate::identity::{MacAddr, NodeId, NodeType, Phase};

/// Adjacency state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdjacencyState {
    /// Heard, but not yet two-way (LAN) or still verifying (point-to-point).
    Initializing,
    /// Usable for routing.
    Up,
}

impl fmt::Display for AdjacencyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdjacencyState::Initializing => "initializing",
            AdjacencyState::Up => "up",
        };
        write!(f, "{}", s)
    }
}

/// A neighbor relationship over one circuit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Adjacency {
    pub circuit: CircuitId,
    /// Neighbor address, in our addressing (area filled in for legacy
    /// neighbors).
    pub neighbor: NodeId,
    pub node_type: NodeType,
    pub phase: Phase,
    pub state: AdjacencyState,
    /// Negotiated block size.
    pub blksize: u16,
    /// Router priority (LAN routers only).
    pub priority: u8,
    /// Neighbor's declared hello interval.
    pub hello_timer: Duration,
    /// Station address on LAN circuits.
    pub station: Option<MacAddr>,
    /// Node name, Phase II neighbors only.
    pub name: Option<String>,
    /// Intercept functions offered by a Phase II neighbor.
    pub int: u8,
    /// Intercept requested by a Phase II neighbor.
    pub rint: u8,
}

impl Adjacency {
    pub fn new(
        circuit: CircuitId,
        neighbor: NodeId,
        node_type: NodeType,
        phase: Phase,
        blksize: u16,
    ) -> Self {
        Self {
            circuit,
            neighbor,
            node_type,
            phase,
            state: AdjacencyState::Initializing,
            blksize,
            priority: 0,
            hello_timer: Duration::ZERO,
            station: None,
            name: None,
            int: 0,
            rint: 0,
        }
    }

    pub fn is_up(&self) -> bool {
        self.state == AdjacencyState::Up
    }

    /// True for level 1 and level 2 router neighbors.
    pub fn is_router(&self) -> bool {
        self.node_type.is_router()
    }

    /// Key used for designated router election and router list
    /// overflow: priority first, then address.
    pub fn rank(&self) -> (u8, NodeId) {
        (self.priority, self.neighbor)
    }
}

/// Why an adjacency went down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownReason {
    /// No hello within the listen time.
    ListenerTimeout,
    /// No longer listed in the neighbor's router hello.
    Dropped,
    /// Neighbor changed type, priority or identity.
    AddressChange,
    /// Inconsistent data in the neighbor's hello.
    DataError,
    /// The circuit restarted its handshake.
    Restarted,
    DatalinkDown,
    /// Circuit disabled by the operator or node shutdown.
    Administrative,
}

impl fmt::Display for DownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownReason::ListenerTimeout => "listener timeout",
            DownReason::Dropped => "dropped",
            DownReason::AddressChange => "address change",
            DownReason::DataError => "data errors",
            DownReason::Restarted => "circuit restarted",
            DownReason::DatalinkDown => "datalink down",
            DownReason::Administrative => "administrative",
        };
        write!(f, "{}", s)
    }
}

/// Why a neighbor was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    InvalidVerification,
    VerificationTimeout,
    AddressOutOfRange,
    AreaMismatch,
    BadNodeType,
    VersionSkew,
    UnexpectedPacket,
    /// The router list on a LAN is full.
    TooManyRouters,
}

impl RejectReason {
    /// True for verification rejects, false for initialization failures.
    pub fn is_verification(&self) -> bool {
        matches!(
            self,
            RejectReason::InvalidVerification | RejectReason::VerificationTimeout
        )
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::InvalidVerification => "invalid verification",
            RejectReason::VerificationTimeout => "verification timeout",
            RejectReason::AddressOutOfRange => "address out of range",
            RejectReason::AreaMismatch => "area mismatch",
            RejectReason::BadNodeType => "bad node type",
            RejectReason::VersionSkew => "version skew",
            RejectReason::UnexpectedPacket => "unexpected packet type",
            RejectReason::TooManyRouters => "too many routers",
        };
        write!(f, "{}", s)
    }
}
