//! Routing Decision Engine
//!
//! Distance-vector route selection at two tiers:
//! 1. **Level 1** - destinations are node numbers within the local area
//!    (node 0 stands for the nearest area router)
//! 2. **Level 2** - destinations are area numbers, computed only on area
//!    routers
//!
//! Each usable adjacency contributes a direct entry for itself and, for
//! router neighbors, the vector last received from it. A destination's
//! route is the minimum over all contributions, ordered by cost, then
//! hops, then circuit id, then neighbor address. Candidates over the hop
//! or cost ceiling are discarded, so a destination either has a bounded
//! route or none at all.

mod update;
#[cfg(test)]
mod tests;

pub use update::{l1_messages, l2_messages, phase3_message};

use std::collections::BTreeMap;
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::circuit::{Adjacency, CircuitId, RoutingLevel};
use crate::identity::{Limits, LocalNode, NodeId, NodeType};
use crate::protocol::RouteEntry;

// ============================================================================
// Routes
// ============================================================================

/// Where a route leads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NextHop {
    pub circuit: CircuitId,
    pub neighbor: NodeId,
}

/// Selected route to one destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub entry: RouteEntry,
    /// `None` when the destination is this node.
    pub next_hop: Option<NextHop>,
}

impl Route {
    fn local() -> Self {
        Self {
            entry: RouteEntry::new(0, 0),
            next_hop: None,
        }
    }

    fn rank(&self) -> (u16, u8, Option<NextHop>) {
        (self.entry.cost, self.entry.hops, self.next_hop)
    }

    /// True if `self` beats `other` in route selection order.
    fn better_than(&self, other: &Route) -> bool {
        self.rank() < other.rank()
    }
}

/// Result of a forwarding lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    /// Destination is this node.
    Local,
    /// Send to `neighbor` over `circuit`.
    Forward { circuit: CircuitId, neighbor: NodeId },
    /// No route.
    Unreachable,
}

impl From<Option<Route>> for RouteDecision {
    fn from(route: Option<Route>) -> Self {
        match route {
            None => RouteDecision::Unreachable,
            Some(Route { next_hop: None, .. }) => RouteDecision::Local,
            Some(Route {
                next_hop: Some(hop), ..
            }) => RouteDecision::Forward {
                circuit: hop.circuit,
                neighbor: hop.neighbor,
            },
        }
    }
}

/// A routing table key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Destination {
    Node(NodeId),
    Area(u8),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Node(id) => write!(f, "node {}", id),
            Destination::Area(a) => write!(f, "area {}", a),
        }
    }
}

/// Reachability transition delivered to subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReachabilityEvent {
    pub destination: Destination,
    pub reachable: bool,
}

// ============================================================================
// Neighbor Vectors
// ============================================================================

/// What one adjacency contributes.
#[derive(Clone, Debug)]
struct NeighborVectors {
    adjacency: Adjacency,
    cost: u16,
    /// Last level 1 vector received, index = node number.
    l1: Vec<RouteEntry>,
    /// Last level 2 vector received, index = area number.
    l2: Vec<RouteEntry>,
}

// ============================================================================
// Engine
// ============================================================================

/// Routing state of the local node.
pub struct RoutingEngine {
    local_id: NodeId,
    router: bool,
    area_router: bool,
    limits: Limits,
    /// Keyed by (circuit, neighbor) so iteration follows the tie-break
    /// order.
    neighbors: BTreeMap<NextHop, NeighborVectors>,
    /// Level 1 table, index = node number.
    l1: Vec<Option<Route>>,
    /// Level 2 table, index = area number.
    l2: Vec<Option<Route>>,
    /// Set when an advertised entry changed since the last `take_changed`.
    changed: bool,
    subscribers: Vec<mpsc::UnboundedSender<ReachabilityEvent>>,
}

impl RoutingEngine {
    pub fn new(local: &LocalNode) -> Self {
        let limits = *local.limits();
        let mut engine = Self {
            local_id: local.id(),
            router: local.is_router(),
            area_router: local.is_area_router(),
            limits,
            neighbors: BTreeMap::new(),
            l1: vec![None; limits.maxnodes as usize + 1],
            l2: vec![None; limits.maxarea as usize + 1],
            changed: false,
            subscribers: Vec::new(),
        };
        engine.recompute();
        engine.changed = false;
        engine
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Number of adjacencies currently contributing.
    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Register for reachability transitions.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ReachabilityEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// True if the advertised vectors changed since the last call.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    // === Inputs ===

    /// An adjacency came up over a circuit of the given cost.
    pub fn adjacency_up(&mut self, adjacency: &Adjacency, cost: u8) {
        let key = NextHop {
            circuit: adjacency.circuit,
            neighbor: adjacency.neighbor,
        };
        debug!(
            circuit = %key.circuit,
            neighbor = %key.neighbor,
            cost,
            "Adjacency added to routing"
        );
        self.neighbors.insert(
            key,
            NeighborVectors {
                adjacency: adjacency.clone(),
                cost: cost.max(1) as u16,
                l1: vec![RouteEntry::INFINITE; self.l1.len()],
                l2: vec![RouteEntry::INFINITE; self.l2.len()],
            },
        );
        self.recompute();
    }

    /// An adjacency went down; its contributions are withdrawn.
    pub fn adjacency_down(&mut self, circuit: CircuitId, neighbor: NodeId) {
        if self
            .neighbors
            .remove(&NextHop { circuit, neighbor })
            .is_some()
        {
            debug!(%circuit, %neighbor, "Adjacency removed from routing");
            self.recompute();
        }
    }

    /// Withdraw every adjacency on a circuit.
    pub fn circuit_down(&mut self, circuit: CircuitId) {
        let before = self.neighbors.len();
        self.neighbors.retain(|k, _| k.circuit != circuit);
        if self.neighbors.len() != before {
            self.recompute();
        }
    }

    /// The designated router of a LAN circuit changed.
    pub fn designated_router_changed(&mut self, circuit: CircuitId, dr: Option<NodeId>) {
        debug!(%circuit, dr = ?dr, "Recomputing after designated router change");
        self.recompute();
    }

    /// Apply entries from a routing message.
    ///
    /// Entries outside the table are ignored. Messages from neighbors
    /// without an adjacency, and from non-routers, are ignored.
    pub fn update(
        &mut self,
        circuit: CircuitId,
        neighbor: NodeId,
        level: RoutingLevel,
        entries: &[(u16, RouteEntry)],
    ) {
        let Some(nv) = self.neighbors.get_mut(&NextHop { circuit, neighbor }) else {
            trace!(%circuit, %neighbor, "Routing message without adjacency");
            return;
        };
        if !nv.adjacency.is_router() {
            return;
        }
        let vector = match level {
            RoutingLevel::Level1 => &mut nv.l1,
            RoutingLevel::Level2 => &mut nv.l2,
        };
        let mut touched = false;
        for &(id, entry) in entries {
            if let Some(slot) = vector.get_mut(id as usize)
                && *slot != entry
            {
                *slot = entry;
                touched = true;
            }
        }
        if touched {
            self.recompute();
        }
    }

    // === Lookups ===

    /// Level 1 route to a node number.
    pub fn l1_route(&self, node: u16) -> Option<Route> {
        self.l1.get(node as usize).copied().flatten()
    }

    /// Level 2 route to an area.
    pub fn l2_route(&self, area: u8) -> Option<Route> {
        self.l2.get(area as usize).copied().flatten()
    }

    /// Next hop for `dst`, in local addressing.
    pub fn route(&self, dst: NodeId) -> RouteDecision {
        if dst == self.local_id {
            return RouteDecision::Local;
        }
        if !self.router {
            return self.endnode_route();
        }
        let local_area = self.local_id.area();
        if dst.area() != local_area && dst.area() != 0 {
            if self.area_router {
                return self.l2_route(dst.area()).into();
            }
            // out of area: nearest area router
            return self.l1_route(0).into();
        }
        if dst.node() == 0 {
            return RouteDecision::Unreachable;
        }
        self.l1_route(dst.node()).into()
    }

    /// Endnodes send everything to their one router, or to the only
    /// neighbor on a point-to-point circuit.
    fn endnode_route(&self) -> RouteDecision {
        self.neighbors
            .values()
            .filter(|nv| nv.adjacency.is_up())
            .min_by_key(|nv| {
                (
                    !nv.adjacency.is_router(),
                    std::cmp::Reverse(nv.adjacency.rank()),
                )
            })
            .map(|nv| RouteDecision::Forward {
                circuit: nv.adjacency.circuit,
                neighbor: nv.adjacency.neighbor,
            })
            .unwrap_or(RouteDecision::Unreachable)
    }

    /// Level 1 vector as advertised: index = node number.
    pub fn advertised_l1(&self) -> Vec<RouteEntry> {
        advertised(&self.l1)
    }

    /// Level 2 vector as advertised: index = area number.
    pub fn advertised_l2(&self) -> Vec<RouteEntry> {
        advertised(&self.l2)
    }

    /// Reachable level 1 destinations.
    pub fn l1_table(&self) -> impl Iterator<Item = (u16, Route)> + '_ {
        table(&self.l1)
    }

    /// Reachable level 2 destinations.
    pub fn l2_table(&self) -> impl Iterator<Item = (u16, Route)> + '_ {
        table(&self.l2)
    }

    // === Computation ===

    fn recompute(&mut self) {
        let l1 = self.compute_l1();
        let l2 = if self.area_router {
            self.compute_l2()
        } else {
            vec![None; self.l2.len()]
        };

        let area = self.local_id.area();
        let mut events = Vec::new();
        diff(&self.l1, &l1, &mut self.changed, |i, reachable| {
            events.push(ReachabilityEvent {
                destination: Destination::Node(NodeId::bare(i as u16).with_area(area)),
                reachable,
            })
        });
        diff(&self.l2, &l2, &mut self.changed, |i, reachable| {
            events.push(ReachabilityEvent {
                destination: Destination::Area(i as u8),
                reachable,
            })
        });
        self.l1 = l1;
        self.l2 = l2;

        if !events.is_empty() {
            debug!(changes = events.len(), "Routing tables changed");
            self.subscribers
                .retain(|tx| events.iter().all(|ev| tx.send(*ev).is_ok()));
        }
    }

    fn compute_l1(&self) -> Vec<Option<Route>> {
        let mut table = vec![None; self.l1.len()];
        let local_area = self.local_id.area();
        if let Some(slot) = table.get_mut(self.local_id.node() as usize) {
            *slot = Some(Route::local());
        }
        if self.area_router {
            table[0] = Some(Route::local());
        }
        if !self.router {
            return table;
        }

        let (maxcost, maxhops) = (self.limits.maxcost, self.limits.maxhops);
        for (key, nv) in &self.neighbors {
            if !nv.adjacency.is_up() {
                continue;
            }
            let neighbor = nv.adjacency.neighbor;
            if neighbor.area() == local_area {
                let direct = Route {
                    entry: RouteEntry::new(nv.cost, 1),
                    next_hop: Some(*key),
                };
                consider(
                    &mut table,
                    neighbor.node() as usize,
                    direct,
                    maxcost,
                    maxhops,
                );
            }
            if !nv.adjacency.is_router() || neighbor.area() != local_area {
                continue;
            }
            for (i, entry) in nv.l1.iter().enumerate() {
                if entry.is_infinite() {
                    continue;
                }
                let candidate = Route {
                    entry: entry.via(nv.cost),
                    next_hop: Some(*key),
                };
                consider(&mut table, i, candidate, maxcost, maxhops);
            }
        }
        table
    }

    fn compute_l2(&self) -> Vec<Option<Route>> {
        let mut table = vec![None; self.l2.len()];
        if let Some(slot) = table.get_mut(self.local_id.area() as usize) {
            *slot = Some(Route::local());
        }
        let (maxcost, maxhops) = (self.limits.amaxcost, self.limits.amaxhops);
        for (key, nv) in &self.neighbors {
            if !nv.adjacency.is_up() || nv.adjacency.node_type != NodeType::Level2Router {
                continue;
            }
            let direct = Route {
                entry: RouteEntry::new(nv.cost, 1),
                next_hop: Some(*key),
            };
            consider(
                &mut table,
                nv.adjacency.neighbor.area() as usize,
                direct,
                maxcost,
                maxhops,
            );
            for (i, entry) in nv.l2.iter().enumerate().skip(1) {
                if entry.is_infinite() {
                    continue;
                }
                let candidate = Route {
                    entry: entry.via(nv.cost),
                    next_hop: Some(*key),
                };
                consider(&mut table, i, candidate, maxcost, maxhops);
            }
        }
        table
    }
}

/// Install `candidate` at `index` if it is within the ceilings and beats
/// the current choice.
fn consider(
    table: &mut [Option<Route>],
    index: usize,
    candidate: Route,
    maxcost: u16,
    maxhops: u8,
) {
    if candidate.entry.cost > maxcost || candidate.entry.hops > maxhops {
        return;
    }
    let Some(slot) = table.get_mut(index) else {
        return;
    };
    match slot {
        Some(current) if !candidate.better_than(current) => {}
        _ => *slot = Some(candidate),
    }
}

fn advertised(table: &[Option<Route>]) -> Vec<RouteEntry> {
    table
        .iter()
        .map(|r| r.map_or(RouteEntry::INFINITE, |r| r.entry))
        .collect()
}

fn table(table: &[Option<Route>]) -> impl Iterator<Item = (u16, Route)> + '_ {
    table
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.map(|r| (i as u16, r)))
}

/// Compare two tables, flagging advertised changes and reporting
/// reachability flips.
fn diff(
    old: &[Option<Route>],
    new: &[Option<Route>],
    changed: &mut bool,
    mut flip: impl FnMut(usize, bool),
) {
    for (i, (a, b)) in old.iter().zip(new).enumerate() {
        if a.map(|r| r.entry) != b.map(|r| r.entry) {
            *changed = true;
        }
        if a.is_some() != b.is_some() {
            flip(i, b.is_some());
        }
    }
}
