//! DECnet: a Phase II/III/IV routing layer
//!
//! Runs the DECnet routing layer over UDP-emulated point-to-point and
//! broadcast circuits: neighbor initialization and hello exchange,
//! designated router election, distance-vector routing at level 1 and
//! level 2, data forwarding, and compatibility with Phase II and Phase III
//! neighbors. All node state is owned by one dispatcher task that applies
//! work items one at a time.

pub mod circuit;
pub mod compat;
pub mod config;
pub mod datalink;
pub mod identity;
pub mod node;
pub mod protocol;
pub mod routing;
pub mod timer;

// Re-export identity types
pub use identity::{
    IdentityError, Limits, LocalNode, MacAddr, NodeDb, NodeId, NodeRecord, NodeType, Phase,
    Version,
};

// Re-export config types
pub use config::{CircuitConfig, CircuitKind, Config, ConfigError, NodeConfig, NodeKind};

// Re-export circuit types
pub use circuit::{Adjacency, AdjacencyState, Circuit, CircuitId, CircuitState, DownReason};

// Re-export datalink types
pub use datalink::{DatalinkError, DatalinkEvent, ReceivedFrame};
pub use datalink::udp::UdpDatalink;

// Re-export routing types
pub use routing::{Destination, ReachabilityEvent, Route, RouteDecision, RoutingEngine};

// Re-export protocol types
pub use protocol::{DataHeader, ProtocolError, RouteEntry};

// Re-export compatibility types
pub use compat::{InterceptMode, InterceptRole};

// Re-export timer types
pub use timer::TimerWheel;

// Re-export node types
pub use node::{
    ControlRequest, Delivery, Node, NodeCounters, NodeError, NodeHandle, NodeSnapshot, NodeState,
    WorkItem,
};
