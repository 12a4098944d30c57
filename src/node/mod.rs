//! DECnet Node Entity
//!
//! Top-level structure representing a running routing node. The Node owns
//! all routing layer state (identity, node database, circuits with their
//! adjacencies, the routing engine, the timer wheel and the intercept
//! relay table) and is its only writer. Datalinks, timers and API callers
//! reach it exclusively through work items applied one at a time by the
//! dispatcher in [`handlers`].

mod handle;
mod handlers;
mod lifecycle;
mod snapshot;
#[cfg(test)]
mod tests;

pub use handle::{ControlRequest, NodeHandle};
pub use snapshot::{AdjacencySnapshot, CircuitSnapshot, NodeSnapshot, RouteSnapshot};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::circuit::{Circuit, CircuitId, CircuitParams, TimerToken};
use crate::compat::{InterceptMode, Relays};
use crate::config::{CircuitConfig, Config, ConfigError};
use crate::datalink::udp::UdpDatalink;
use crate::datalink::{
    event_channel, frame_channel, DatalinkError, DatalinkEvent, EventRx, EventTx, FrameRx,
    SendQueue,
};
use crate::identity::{IdentityError, LocalNode, NodeDb, NodeId};
use crate::routing::RoutingEngine;
use crate::timer::{TimerWheel, DEFAULT_SLOTS};

/// Depth of the control request channel.
const CONTROL_QUEUE: usize = 32;

/// Errors related to node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node not started")]
    NotStarted,

    #[error("node already started")]
    AlreadyStarted,

    #[error("node already stopped")]
    AlreadyStopped,

    #[error("node dispatcher is not running")]
    Stopped,

    #[error("circuit not found: {0}")]
    CircuitNotFound(String),

    #[error("destination unreachable: {0}")]
    Unreachable(NodeId),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("datalink error: {0}")]
    Datalink(#[from] DatalinkError),
}

/// Node operational state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Created but not started.
    Created,
    /// Starting up (initializing datalinks).
    Starting,
    /// Fully operational.
    Running,
    /// Shutting down.
    Stopping,
    /// Stopped.
    Stopped,
}

impl NodeState {
    /// Check if node is operational.
    pub fn is_operational(&self) -> bool {
        matches!(self, NodeState::Running)
    }

    /// Check if node can be started.
    pub fn can_start(&self) -> bool {
        matches!(self, NodeState::Created | NodeState::Stopped)
    }

    /// Check if node can be stopped.
    pub fn can_stop(&self) -> bool {
        matches!(self, NodeState::Running)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Created => "created",
            NodeState::Starting => "starting",
            NodeState::Running => "running",
            NodeState::Stopping => "stopping",
            NodeState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// One unit of dispatcher work. Arrival order is processing order.
#[derive(Debug)]
pub enum WorkItem {
    Datalink(DatalinkEvent),
    Timer(TimerToken),
    Control(ControlRequest),
}

/// Data addressed to this node, handed to the layer above.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub src: NodeId,
    /// The packet came back because its destination was unreachable.
    pub rts: bool,
    pub payload: Vec<u8>,
}

/// Forwarding counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeCounters {
    pub delivered: u64,
    pub originated: u64,
    pub forwarded: u64,
    pub returned: u64,
    pub unreachable_loss: u64,
    pub aged_loss: u64,
    pub out_of_range: u64,
}

/// A configured circuit with its send path.
struct CircuitSlot {
    circuit: Circuit,
    config: CircuitConfig,
    queue: SendQueue,
    /// Administrative state.
    enabled: bool,
    /// Last state reported by the datalink.
    datalink_up: bool,
}

/// A DECnet routing node.
///
/// ## Work flow
///
/// Datalinks push [`DatalinkEvent`]s into the event channel, API callers
/// push [`ControlRequest`]s through a [`NodeHandle`], and the timer wheel
/// yields expired [`TimerToken`]s on each tick. The dispatcher turns each
/// into a [`WorkItem`] and runs it to completion before looking at the
/// next one, so circuit state machines and the routing engine never see
/// concurrent updates.
pub struct Node {
    // === Identity ===
    local: LocalNode,
    nodes: NodeDb,
    intercept: InterceptMode,

    // === Configuration ===
    config: Config,

    // === State ===
    state: NodeState,

    // === Circuits ===
    circuits: BTreeMap<CircuitId, CircuitSlot>,
    /// Startup registry: circuit name -> id.
    circuit_names: HashMap<String, CircuitId>,

    // === Routing ===
    routing: RoutingEngine,
    relays: Relays,

    // === Timers ===
    timers: TimerWheel<TimerToken>,

    // === Channels ===
    event_tx: EventTx,
    event_rx: Option<EventRx>,
    control_tx: mpsc::Sender<ControlRequest>,
    control_rx: Option<mpsc::Receiver<ControlRequest>>,
    delivery_tx: mpsc::UnboundedSender<Delivery>,
    delivery_rx: Option<mpsc::UnboundedReceiver<Delivery>>,

    // === Datalinks ===
    datalinks: Vec<UdpDatalink>,

    // === Counters ===
    counters: NodeCounters,
}

impl Node {
    /// Create a node from validated configuration.
    ///
    /// Circuits are registered in configuration order, numbered from 1,
    /// with detached send queues until a datalink is attached.
    pub fn new(config: Config) -> Result<Self, NodeError> {
        config.validate()?;
        let local = config.local_node()?;
        let nodes = config.node_db()?;
        let intercept = config.node.intercept();

        let mut circuits = BTreeMap::new();
        let mut circuit_names = HashMap::new();
        for (i, cfg) in config.circuits.iter().enumerate() {
            let id = CircuitId::new(i as u16 + 1);
            circuit_names.insert(cfg.name.clone(), id);
            circuits.insert(
                id,
                CircuitSlot {
                    circuit: Circuit::new(CircuitParams::from_config(id, cfg)),
                    config: cfg.clone(),
                    queue: SendQueue::detached(),
                    enabled: cfg.is_enabled(),
                    datalink_up: false,
                },
            );
        }

        let routing = RoutingEngine::new(&local);
        let timers = TimerWheel::new(DEFAULT_SLOTS, config.node.tick());
        let (event_tx, event_rx) = event_channel(config.node.work_queue());
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE);
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();

        Ok(Self {
            local,
            nodes,
            intercept,
            config,
            state: NodeState::Created,
            circuits,
            circuit_names,
            routing,
            relays: Relays::new(),
            timers,
            event_tx,
            event_rx: Some(event_rx),
            control_tx,
            control_rx: Some(control_rx),
            delivery_tx,
            delivery_rx: Some(delivery_rx),
            datalinks: Vec::new(),
            counters: NodeCounters::default(),
        })
    }

    // === Accessors ===

    /// This node's identity.
    pub fn local(&self) -> &LocalNode {
        &self.local
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn counters(&self) -> &NodeCounters {
        &self.counters
    }

    pub fn routing(&self) -> &RoutingEngine {
        &self.routing
    }

    pub fn relays(&self) -> &Relays {
        &self.relays
    }

    /// Look up a circuit id by configured name.
    pub fn circuit_id(&self, name: &str) -> Option<CircuitId> {
        self.circuit_names.get(name).copied()
    }

    pub fn circuit(&self, id: CircuitId) -> Option<&Circuit> {
        self.circuits.get(&id).map(|s| &s.circuit)
    }

    pub fn circuit_count(&self) -> usize {
        self.circuits.len()
    }

    /// Local socket address of a circuit's running datalink.
    pub fn datalink_addr(&self, id: CircuitId) -> Option<SocketAddr> {
        self.datalinks
            .iter()
            .find(|d| d.circuit() == id)
            .and_then(|d| d.local_addr())
    }

    /// Sender for datalink events, for datalinks run outside the node.
    pub fn event_sender(&self) -> EventTx {
        self.event_tx.clone()
    }

    /// A cloneable handle for the control API.
    pub fn handle(&self) -> NodeHandle {
        NodeHandle::new(self.control_tx.clone())
    }

    /// Take the receiver for data addressed to this node. Returns `None`
    /// after the first call.
    pub fn take_deliveries(&mut self) -> Option<mpsc::UnboundedReceiver<Delivery>> {
        self.delivery_rx.take()
    }

    /// Attach a send queue to a circuit and return its receiving end.
    ///
    /// Frames the dispatcher sends on the circuit from now on go into the
    /// returned receiver.
    pub fn attach(&mut self, id: CircuitId) -> Option<FrameRx> {
        let depth = self.config.node.send_queue();
        let slot = self.circuits.get_mut(&id)?;
        let (tx, rx) = frame_channel(depth);
        slot.queue = SendQueue::new(tx);
        Some(rx)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("local", &self.local)
            .field("state", &self.state)
            .field("circuits", &self.circuits.len())
            .field("neighbors", &self.routing.neighbor_count())
            .finish()
    }
}
