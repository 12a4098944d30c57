//! Point-in-time views of node state for the control API.

use std::time::Duration;

use crate::circuit::{AdjacencyState, CircuitId, CircuitState};
use crate::config::CircuitKind;
use crate::identity::{NodeId, NodeType, Phase};
use crate::routing::Route;

use super::{Node, NodeCounters, NodeState};

/// Node state between two work items.
#[derive(Clone, Debug)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub node_type: NodeType,
    pub phase: Phase,
    pub state: NodeState,
    pub circuits: Vec<CircuitSnapshot>,
    /// Reachable nodes in our area, by node number.
    pub l1: Vec<RouteSnapshot>,
    /// Reachable areas, by area number. Empty unless we are an area router.
    pub l2: Vec<RouteSnapshot>,
    pub counters: NodeCounters,
}

impl NodeSnapshot {
    pub fn circuit(&self, name: &str) -> Option<&CircuitSnapshot> {
        self.circuits.iter().find(|c| c.name == name)
    }

    /// Number of adjacencies in the Up state across all circuits.
    pub fn up_adjacencies(&self) -> usize {
        self.circuits
            .iter()
            .flat_map(|c| &c.adjacencies)
            .filter(|a| a.state == AdjacencyState::Up)
            .count()
    }
}

#[derive(Clone, Debug)]
pub struct CircuitSnapshot {
    pub id: CircuitId,
    pub name: String,
    pub kind: CircuitKind,
    pub state: CircuitState,
    pub enabled: bool,
    pub cost: u8,
    pub hello_timer: Duration,
    pub designated_router: Option<NodeId>,
    pub is_dr: bool,
    pub adjacencies: Vec<AdjacencySnapshot>,

    // === Counters ===
    pub frames_received: u64,
    pub frames_sent: u64,
    pub format_errors: u64,
    pub send_drops: u64,
    pub adjacency_down: u64,
    pub verification_rejects: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdjacencySnapshot {
    pub neighbor: NodeId,
    pub node_type: NodeType,
    pub phase: Phase,
    pub state: AdjacencyState,
    pub priority: u8,
    pub blksize: u16,
}

/// One routing table row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteSnapshot {
    /// Node number (level 1) or area number (level 2).
    pub destination: u16,
    pub cost: u16,
    pub hops: u8,
    pub circuit: Option<CircuitId>,
    pub neighbor: Option<NodeId>,
}

impl RouteSnapshot {
    fn new(destination: u16, route: Route) -> Self {
        Self {
            destination,
            cost: route.entry.cost,
            hops: route.entry.hops,
            circuit: route.next_hop.map(|h| h.circuit),
            neighbor: route.next_hop.map(|h| h.neighbor),
        }
    }
}

impl Node {
    /// Capture circuits, adjacencies, routing tables and counters.
    pub fn snapshot(&self) -> NodeSnapshot {
        let circuits = self
            .circuits
            .values()
            .map(|slot| {
                let circuit = &slot.circuit;
                let params = circuit.params();
                let counters = circuit.counters();
                CircuitSnapshot {
                    id: params.id,
                    name: params.name.clone(),
                    kind: params.kind,
                    state: circuit.state(),
                    enabled: slot.enabled,
                    cost: params.cost,
                    hello_timer: params.t3,
                    designated_router: circuit.designated_router(),
                    is_dr: circuit.is_dr(),
                    adjacencies: circuit
                        .adjacencies()
                        .into_iter()
                        .map(|a| AdjacencySnapshot {
                            neighbor: a.neighbor,
                            node_type: a.node_type,
                            phase: a.phase,
                            state: a.state,
                            priority: a.priority,
                            blksize: a.blksize,
                        })
                        .collect(),
                    frames_received: counters.frames_received,
                    frames_sent: slot.queue.sent(),
                    format_errors: counters.format_errors,
                    send_drops: slot.queue.dropped(),
                    adjacency_down: counters.adjacency_down,
                    verification_rejects: counters.verification_rejects,
                }
            })
            .collect();

        NodeSnapshot {
            id: self.local.id(),
            name: self.local.name().to_string(),
            node_type: self.local.node_type(),
            phase: self.local.phase(),
            state: self.state,
            circuits,
            l1: self
                .routing
                .l1_table()
                .map(|(dst, route)| RouteSnapshot::new(dst, route))
                .collect(),
            l2: self
                .routing
                .l2_table()
                .map(|(dst, route)| RouteSnapshot::new(dst, route))
                .collect(),
            counters: self.counters,
        }
    }
}
