use super::*;
use crate::circuit::AdjacencyState;
use crate::identity::Phase;
use proptest::prelude::*;

fn node(area: u8, n: u16) -> NodeId {
    NodeId::new(area, n).unwrap()
}

fn local_node(id: NodeId, ntype: NodeType) -> LocalNode {
    LocalNode::new(id, "LOCAL", Phase::Phase4, ntype, Limits::default()).unwrap()
}

fn router(ntype: NodeType) -> RoutingEngine {
    RoutingEngine::new(&local_node(node(1, 1), ntype))
}

fn up(circuit: u16, neighbor: NodeId, ntype: NodeType) -> Adjacency {
    let mut adj = Adjacency::new(CircuitId::new(circuit), neighbor, ntype, Phase::Phase4, 1498);
    adj.state = AdjacencyState::Up;
    adj
}

fn forward(circuit: u16, neighbor: NodeId) -> RouteDecision {
    RouteDecision::Forward {
        circuit: CircuitId::new(circuit),
        neighbor,
    }
}

// ===== Lookup Tests =====

#[test]
fn test_self_is_local() {
    let e = router(NodeType::Level1Router);
    assert_eq!(e.route(node(1, 1)), RouteDecision::Local);
    assert_eq!(e.l1_route(1).unwrap().entry, RouteEntry::new(0, 0));
    assert_eq!(e.route(node(1, 2)), RouteDecision::Unreachable);
}

#[test]
fn test_direct_adjacency_route() {
    let mut e = router(NodeType::Level1Router);
    e.adjacency_up(&up(1, node(1, 2), NodeType::Endnode), 4);
    assert_eq!(e.route(node(1, 2)), forward(1, node(1, 2)));
    assert_eq!(e.l1_route(2).unwrap().entry, RouteEntry::new(4, 1));

    e.adjacency_down(CircuitId::new(1), node(1, 2));
    assert_eq!(e.route(node(1, 2)), RouteDecision::Unreachable);
}

#[test]
fn test_endnode_vectors_ignored() {
    let mut e = router(NodeType::Level1Router);
    e.adjacency_up(&up(1, node(1, 2), NodeType::Endnode), 1);
    e.update(
        CircuitId::new(1),
        node(1, 2),
        RoutingLevel::Level1,
        &[(9, RouteEntry::new(1, 1))],
    );
    assert_eq!(e.route(node(1, 9)), RouteDecision::Unreachable);
}

#[test]
fn test_failover_to_costlier_path() {
    // two paths to 1.9: via 1.2 total 9, via 1.3 total 11
    let mut e = router(NodeType::Level1Router);
    e.adjacency_up(&up(1, node(1, 2), NodeType::Level1Router), 4);
    e.adjacency_up(&up(2, node(1, 3), NodeType::Level1Router), 6);
    e.update(
        CircuitId::new(1),
        node(1, 2),
        RoutingLevel::Level1,
        &[(9, RouteEntry::new(5, 1))],
    );
    e.update(
        CircuitId::new(2),
        node(1, 3),
        RoutingLevel::Level1,
        &[(9, RouteEntry::new(5, 1))],
    );
    assert_eq!(e.route(node(1, 9)), forward(1, node(1, 2)));
    assert_eq!(e.l1_route(9).unwrap().entry, RouteEntry::new(9, 2));

    e.adjacency_down(CircuitId::new(1), node(1, 2));
    assert_eq!(e.route(node(1, 9)), forward(2, node(1, 3)));
    assert_eq!(e.l1_route(9).unwrap().entry, RouteEntry::new(11, 2));
}

#[test]
fn test_cost_over_ceiling_is_unreachable() {
    let mut e = router(NodeType::Level1Router);
    e.adjacency_up(&up(1, node(1, 2), NodeType::Level1Router), 200);
    assert_eq!(e.route(node(1, 2)), RouteDecision::Unreachable);
    assert!(e.advertised_l1()[2].is_infinite());
}

#[test]
fn test_hops_over_ceiling_is_unreachable() {
    let mut e = router(NodeType::Level1Router);
    e.adjacency_up(&up(1, node(1, 2), NodeType::Level1Router), 1);
    e.update(
        CircuitId::new(1),
        node(1, 2),
        RoutingLevel::Level1,
        &[(9, RouteEntry::new(3, 16)), (10, RouteEntry::new(3, 15))],
    );
    assert_eq!(e.route(node(1, 9)), RouteDecision::Unreachable);
    assert_eq!(e.route(node(1, 10)), forward(1, node(1, 2)));
}

#[test]
fn test_tie_breaks_on_hops_then_circuit() {
    let mut e = router(NodeType::Level1Router);
    e.adjacency_up(&up(3, node(1, 3), NodeType::Level1Router), 2);
    e.adjacency_up(&up(2, node(1, 2), NodeType::Level1Router), 2);
    e.adjacency_up(&up(1, node(1, 4), NodeType::Level1Router), 2);
    // same cost; 1.3 offers fewer hops
    e.update(CircuitId::new(3), node(1, 3), RoutingLevel::Level1, &[(9, RouteEntry::new(3, 1))]);
    e.update(CircuitId::new(2), node(1, 2), RoutingLevel::Level1, &[(9, RouteEntry::new(3, 4))]);
    assert_eq!(e.route(node(1, 9)), forward(3, node(1, 3)));

    // equal cost and hops: lowest circuit wins
    e.update(CircuitId::new(1), node(1, 4), RoutingLevel::Level1, &[(9, RouteEntry::new(3, 1))]);
    assert_eq!(e.route(node(1, 9)), forward(1, node(1, 4)));
}

#[test]
fn test_out_of_area_via_nearest_area_router() {
    let mut e = router(NodeType::Level1Router);
    assert_eq!(e.route(node(5, 1)), RouteDecision::Unreachable);
    e.adjacency_up(&up(1, node(1, 7), NodeType::Level2Router), 3);
    e.update(CircuitId::new(1), node(1, 7), RoutingLevel::Level1, &[(0, RouteEntry::new(0, 0))]);
    assert_eq!(e.route(node(5, 1)), forward(1, node(1, 7)));
}

#[test]
fn test_area_router_level2() {
    let mut e = router(NodeType::Level2Router);
    assert_eq!(e.l1_route(0).unwrap().next_hop, None);
    assert_eq!(e.l2_route(1).unwrap().next_hop, None);

    e.adjacency_up(&up(1, node(4, 2), NodeType::Level2Router), 5);
    assert_eq!(e.route(node(4, 33)), forward(1, node(4, 2)));
    // an out-of-area neighbor is not a level 1 destination
    assert!(e.l1_route(2).is_none());

    e.update(CircuitId::new(1), node(4, 2), RoutingLevel::Level2, &[(9, RouteEntry::new(10, 2))]);
    assert_eq!(e.l2_route(9).unwrap().entry, RouteEntry::new(15, 3));
    assert_eq!(e.route(node(9, 1)), forward(1, node(4, 2)));
    assert_eq!(e.route(node(8, 1)), RouteDecision::Unreachable);
}

#[test]
fn test_level1_router_has_no_level2_table() {
    let mut e = router(NodeType::Level1Router);
    e.adjacency_up(&up(1, node(4, 2), NodeType::Level2Router), 5);
    assert_eq!(e.l2_table().count(), 0);
}

#[test]
fn test_endnode_routes_to_router() {
    let mut e = RoutingEngine::new(&local_node(node(1, 50), NodeType::Endnode));
    assert_eq!(e.route(node(1, 9)), RouteDecision::Unreachable);
    e.adjacency_up(&up(1, node(1, 3), NodeType::Level1Router), 1);
    e.adjacency_up(&up(1, node(1, 2), NodeType::Level2Router), 1);
    assert_eq!(e.route(node(1, 9)), forward(1, node(1, 3)));
    assert_eq!(e.route(node(7, 9)), forward(1, node(1, 3)));
    assert_eq!(e.route(node(1, 50)), RouteDecision::Local);
}

#[test]
fn test_update_without_adjacency_ignored() {
    let mut e = router(NodeType::Level1Router);
    e.update(CircuitId::new(1), node(1, 2), RoutingLevel::Level1, &[(9, RouteEntry::new(1, 1))]);
    assert_eq!(e.route(node(1, 9)), RouteDecision::Unreachable);
}

#[test]
fn test_circuit_down_withdraws_all() {
    let mut e = router(NodeType::Level1Router);
    e.adjacency_up(&up(1, node(1, 2), NodeType::Endnode), 1);
    e.adjacency_up(&up(1, node(1, 3), NodeType::Endnode), 1);
    e.adjacency_up(&up(2, node(1, 4), NodeType::Endnode), 1);
    e.circuit_down(CircuitId::new(1));
    assert_eq!(e.neighbor_count(), 1);
    assert_eq!(e.l1_table().count(), 2);
}

// ===== Change Tracking =====

#[test]
fn test_take_changed() {
    let mut e = router(NodeType::Level1Router);
    assert!(!e.take_changed());
    e.adjacency_up(&up(1, node(1, 2), NodeType::Endnode), 1);
    assert!(e.take_changed());
    assert!(!e.take_changed());
    // same vector again changes nothing
    e.adjacency_up(&up(1, node(1, 2), NodeType::Endnode), 1);
    assert!(!e.take_changed());
}

#[test]
fn test_dr_change_keeps_router_tables() {
    let mut e = router(NodeType::Level1Router);
    e.adjacency_up(&up(1, node(1, 2), NodeType::Level1Router), 1);
    e.take_changed();
    e.designated_router_changed(CircuitId::new(1), Some(node(1, 2)));
    assert!(!e.take_changed());
    assert_eq!(e.route(node(1, 2)), forward(1, node(1, 2)));
}

#[tokio::test]
async fn test_reachability_subscribers() {
    let mut e = router(NodeType::Level1Router);
    let mut rx = e.subscribe();
    e.adjacency_up(&up(1, node(1, 2), NodeType::Endnode), 1);
    assert_eq!(
        rx.recv().await,
        Some(ReachabilityEvent {
            destination: Destination::Node(node(1, 2)),
            reachable: true,
        })
    );
    e.adjacency_down(CircuitId::new(1), node(1, 2));
    assert_eq!(
        rx.recv().await,
        Some(ReachabilityEvent {
            destination: Destination::Node(node(1, 2)),
            reachable: false,
        })
    );

    // dropped receivers are pruned
    drop(rx);
    e.adjacency_up(&up(1, node(1, 2), NodeType::Endnode), 1);
    assert!(e.subscribers.is_empty());
}

// ===== Properties =====

proptest! {
    /// With one router neighbor per circuit, every selected route is the
    /// minimum over neighbors within the ceilings, and nothing over the
    /// ceilings is ever installed.
    #[test]
    fn prop_routes_minimal_and_bounded(
        costs in proptest::collection::vec(1u8..60, 1..5),
        vectors in proptest::collection::vec(
            proptest::collection::vec((0u16..200, 0u8..25), 20),
            5,
        ),
    ) {
        let mut e = router(NodeType::Level1Router);
        let limits = Limits::default();
        for (i, cost) in costs.iter().enumerate() {
            let c = i as u16 + 1;
            let neighbor = node(1, 100 + c);
            e.adjacency_up(&up(c, neighbor, NodeType::Level1Router), *cost);
            let entries: Vec<(u16, RouteEntry)> = vectors[i]
                .iter()
                .enumerate()
                .map(|(d, (cost, hops))| (d as u16 + 2, RouteEntry::new(*cost, *hops)))
                .collect();
            e.update(CircuitId::new(c), neighbor, RoutingLevel::Level1, &entries);
        }

        for dst in 2u16..22 {
            let best = costs
                .iter()
                .enumerate()
                .map(|(i, cost)| {
                    let (ec, eh) = vectors[i][dst as usize - 2];
                    RouteEntry::new(ec, eh).via(*cost as u16)
                })
                .filter(|r| {
                    !r.is_infinite() && r.cost <= limits.maxcost && r.hops <= limits.maxhops
                })
                .map(|r| (r.cost, r.hops))
                .min();
            let got = e.l1_route(dst).map(|r| (r.entry.cost, r.entry.hops));
            prop_assert_eq!(got, best);
        }
        for (_, route) in e.l1_table() {
            prop_assert!(route.entry.cost <= limits.maxcost);
            prop_assert!(route.entry.hops <= limits.maxhops);
        }
    }
}
