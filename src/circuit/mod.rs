//! Circuits and Adjacencies
//!
//! One state machine per configured circuit:
//! 1. **PtpCircuit** - point-to-point: Init/Verify handshake with the one
//!    possible neighbor, hellos and the listen timer while up
//! 2. **LanCircuit** - broadcast: router and endnode hellos, one
//!    adjacency per neighbor, designated router election
//!
//! The `Circuit` enum holds either kind so the node can store them
//! together. The state machines never do I/O. Every input is a received
//! frame, an expired timer or an administrative call; every output is a
//! [`CircuitEvent`] the dispatcher applies (frames to queue, timers to
//! start or cancel, adjacency changes for the routing engine).

mod adjacency;
mod lan;
mod ptp;

pub use adjacency::{Adjacency, AdjacencyState, DownReason, RejectReason};
pub use lan::LanCircuit;
pub use ptp::PtpCircuit;

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::compat::{InterceptMode, RelayKey};
use crate::config::{CircuitConfig, CircuitKind};
use crate::datalink::ReceivedFrame;
use crate::identity::{LocalNode, MacAddr, NodeDb, NodeId};
use crate::protocol::{DataHeader, ProtocolError, RouteEntry};

/// Hello holdoff after a change in hello content.
pub const T2: Duration = Duration::from_secs(1);

/// Delay before this router acts as designated router.
pub const DR_DELAY: Duration = Duration::from_secs(5);

/// Point-to-point listen timer multiplier.
pub const T3_MULT: u32 = 2;

/// LAN listen timer multiplier.
pub const BCT3_MULT: u32 = 3;

/// Lifetime of an endnode's previous-hop cache entry.
pub const PREV_HOP_LIFETIME: Duration = Duration::from_secs(60);

/// Test data bytes carried in our hellos.
const HELLO_TEST_LEN: usize = 10;

/// Bytes of a malformed frame included in the format error log.
const FORMAT_ERROR_DUMP: usize = 16;

// ============================================================================
// Identifiers and Parameters
// ============================================================================

/// Circuit identifier, assigned in configuration order starting at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CircuitId(u16);

impl CircuitId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "circuit-{}", self.0)
    }
}

/// Resolved circuit parameters.
#[derive(Clone, Debug)]
pub struct CircuitParams {
    pub id: CircuitId,
    pub name: String,
    pub kind: CircuitKind,
    pub cost: u8,
    /// Hello interval.
    pub t3: Duration,
    pub priority: u8,
    /// Maximum routers on a LAN.
    pub nr: u8,
    /// Require neighbors to verify.
    pub verify: bool,
    pub blksize: u16,
}

impl CircuitParams {
    pub fn from_config(id: CircuitId, config: &CircuitConfig) -> Self {
        Self {
            id,
            name: config.name.clone(),
            kind: config.kind,
            cost: config.cost(),
            t3: config.t3(),
            priority: config.priority(),
            nr: config.nr(),
            verify: config.verify,
            blksize: config.blksize(),
        }
    }

    /// Hello interval as carried in hellos and inits.
    pub(crate) fn t3_secs(&self) -> u16 {
        self.t3.as_secs().min(u16::MAX as u64) as u16
    }
}

/// Circuit state.
///
/// LAN circuits are only ever `Halted` or `Up`; the per-neighbor states
/// live in their adjacencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Halted,
    Initializing,
    Verifying,
    Up,
}

impl CircuitState {
    pub fn is_up(&self) -> bool {
        matches!(self, CircuitState::Up)
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Halted => "halted",
            CircuitState::Initializing => "initializing",
            CircuitState::Verifying => "verifying",
            CircuitState::Up => "up",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Timers and Events
// ============================================================================

/// Owner of a timer in the node's wheel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerToken {
    /// Periodic hello (or Init resend while initializing).
    Hello(CircuitId),
    /// Neighbor silence limit.
    Listen { circuit: CircuitId, neighbor: NodeId },
    /// Pending promotion of this router to designated router.
    DrDelay(CircuitId),
    /// Deferred hello after a change in hello content.
    HelloHoldoff(CircuitId),
    /// Periodic routing message on a circuit.
    RouteUpdate(CircuitId),
    /// Deferred routing messages after a routing table change.
    RouteHoldoff,
    /// Idle limit of an intercept relay entry.
    Relay(RelayKey),
    /// Endnode previous-hop cache entry.
    PrevHop { circuit: CircuitId, node: NodeId },
}

impl TimerToken {
    /// The circuit this timer belongs to, if any.
    pub fn circuit(&self) -> Option<CircuitId> {
        match self {
            TimerToken::Hello(c)
            | TimerToken::DrDelay(c)
            | TimerToken::HelloHoldoff(c)
            | TimerToken::RouteUpdate(c) => Some(*c),
            TimerToken::Listen { circuit, .. } | TimerToken::PrevHop { circuit, .. } => {
                Some(*circuit)
            }
            TimerToken::RouteHoldoff | TimerToken::Relay(_) => None,
        }
    }
}

/// Which distance vector a routing message carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoutingLevel {
    /// Nodes within the area.
    Level1,
    /// Areas.
    Level2,
}

/// Routed data received on a circuit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundData {
    /// Adjacent node the packet came from.
    pub neighbor: NodeId,
    /// Sending station on LAN circuits.
    pub station: Option<MacAddr>,
    /// Header with addresses already localized.
    pub header: DataHeader,
    /// Intra-LAN bit of a long header.
    pub ie: bool,
    pub payload: Vec<u8>,
}

/// Output of a circuit state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CircuitEvent {
    /// Queue a frame. `dst` is the station on LAN circuits.
    Send { dst: Option<MacAddr>, data: Vec<u8> },
    StartTimer(TimerToken, Duration),
    CancelTimer(TimerToken),
    AdjacencyUp(Adjacency),
    AdjacencyDown { neighbor: NodeId, reason: DownReason },
    Rejected {
        neighbor: Option<NodeId>,
        reason: RejectReason,
    },
    DrChanged(Option<NodeId>),
    Routing {
        neighbor: NodeId,
        level: RoutingLevel,
        entries: Vec<(u16, RouteEntry)>,
    },
    Data(InboundData),
    /// A frame from a Phase II neighbor for intercept processing.
    Phase2Frame { neighbor: NodeId, frame: Vec<u8> },
}

/// Read-only node state the state machines consult.
#[derive(Clone, Copy)]
pub struct CircuitCtx<'a> {
    pub local: &'a LocalNode,
    pub nodes: &'a NodeDb,
    pub intercept: InterceptMode,
}

/// Per-circuit counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CircuitCounters {
    pub frames_received: u64,
    pub format_errors: u64,
    pub adjacency_down: u64,
    pub verification_rejects: u64,
    pub init_failures: u64,
}

impl CircuitCounters {
    fn record_reject(&mut self, reason: RejectReason) {
        if reason.is_verification() {
            self.verification_rejects += 1;
        } else {
            self.init_failures += 1;
        }
    }
}

/// Count and log a frame that failed to decode.
fn format_error(
    params: &CircuitParams,
    counters: &mut CircuitCounters,
    data: &[u8],
    error: &ProtocolError,
) {
    counters.format_errors += 1;
    let dump = &data[..data.len().min(FORMAT_ERROR_DUMP)];
    debug!(
        circuit = %params.name,
        error = %error,
        packet = %hex::encode(dump),
        "Packet format error"
    );
}

// ============================================================================
// Circuit
// ============================================================================

/// A circuit of either kind.
#[derive(Debug)]
pub enum Circuit {
    Ptp(PtpCircuit),
    Lan(LanCircuit),
}

impl Circuit {
    pub fn new(params: CircuitParams) -> Self {
        match params.kind {
            CircuitKind::Ptp => Circuit::Ptp(PtpCircuit::new(params)),
            CircuitKind::Lan => Circuit::Lan(LanCircuit::new(params)),
        }
    }

    pub fn params(&self) -> &CircuitParams {
        match self {
            Circuit::Ptp(c) => c.params(),
            Circuit::Lan(c) => c.params(),
        }
    }

    pub fn id(&self) -> CircuitId {
        self.params().id
    }

    pub fn kind(&self) -> CircuitKind {
        self.params().kind
    }

    pub fn state(&self) -> CircuitState {
        match self {
            Circuit::Ptp(c) => c.state(),
            Circuit::Lan(c) => c.state(),
        }
    }

    pub fn counters(&self) -> &CircuitCounters {
        match self {
            Circuit::Ptp(c) => c.counters(),
            Circuit::Lan(c) => c.counters(),
        }
    }

    /// Bring the circuit up from `Halted`.
    pub fn start(&mut self, ctx: &CircuitCtx<'_>, out: &mut Vec<CircuitEvent>) {
        match self {
            Circuit::Ptp(c) => c.start(ctx, out),
            Circuit::Lan(c) => c.start(ctx, out),
        }
    }

    /// Halt the circuit, withdrawing every adjacency.
    pub fn stop(&mut self, reason: DownReason, out: &mut Vec<CircuitEvent>) {
        match self {
            Circuit::Ptp(c) => c.stop(reason, out),
            Circuit::Lan(c) => c.stop(reason, out),
        }
    }

    /// The datalink reported the circuit down.
    pub fn datalink_down(&mut self, ctx: &CircuitCtx<'_>, out: &mut Vec<CircuitEvent>) {
        match self {
            Circuit::Ptp(c) => c.datalink_down(ctx, out),
            Circuit::Lan(c) => c.stop(DownReason::DatalinkDown, out),
        }
    }

    pub fn receive(
        &mut self,
        ctx: &CircuitCtx<'_>,
        frame: &ReceivedFrame,
        out: &mut Vec<CircuitEvent>,
    ) {
        match self {
            Circuit::Ptp(c) => c.receive(ctx, &frame.data, out),
            Circuit::Lan(c) => c.receive(ctx, frame.src, &frame.data, out),
        }
    }

    pub fn timer(&mut self, ctx: &CircuitCtx<'_>, token: &TimerToken, out: &mut Vec<CircuitEvent>) {
        match self {
            Circuit::Ptp(c) => c.timer(ctx, token, out),
            Circuit::Lan(c) => c.timer(ctx, token, out),
        }
    }

    /// Adjacency with `neighbor`, in any state.
    pub fn adjacency(&self, neighbor: NodeId) -> Option<&Adjacency> {
        match self {
            Circuit::Ptp(c) => c.adjacency().filter(|a| a.neighbor == neighbor),
            Circuit::Lan(c) => c.adjacency(neighbor),
        }
    }

    pub fn adjacencies(&self) -> Vec<&Adjacency> {
        match self {
            Circuit::Ptp(c) => c.adjacency().into_iter().collect(),
            Circuit::Lan(c) => c.adjacencies().collect(),
        }
    }

    /// Current designated router on LAN circuits.
    pub fn designated_router(&self) -> Option<NodeId> {
        match self {
            Circuit::Ptp(_) => None,
            Circuit::Lan(c) => c.designated_router(),
        }
    }

    /// True if this node is designated router on the circuit.
    pub fn is_dr(&self) -> bool {
        match self {
            Circuit::Ptp(_) => false,
            Circuit::Lan(c) => c.is_dr(),
        }
    }

    /// Station to send a packet for `dst` to, via `neighbor`.
    pub fn next_station(&self, dst: NodeId, neighbor: NodeId) -> Option<MacAddr> {
        match self {
            Circuit::Ptp(_) => None,
            Circuit::Lan(c) => Some(c.next_station(dst, neighbor)),
        }
    }
}
