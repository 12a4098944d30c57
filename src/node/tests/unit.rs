//! Node construction, accessors and local forwarding decisions.

use super::*;
use crate::circuit::{CircuitEvent, TimerToken};
use crate::routing::RouteDecision;

#[test]
fn test_node_creation() {
    let node = make_node();
    assert_eq!(node.state(), NodeState::Created);
    assert_eq!(node.local().id(), node_id("1.1"));
    assert_eq!(node.circuit_count(), 0);
    assert!(node.relays().is_empty());
    assert_eq!(*node.counters(), NodeCounters::default());
}

#[test]
fn test_node_rejects_invalid_config() {
    let mut config = make_config("1.1", "LOCAL", NodeKind::L1Router, &[]);
    config.node.name = None;
    assert!(matches!(Node::new(config), Err(NodeError::Config(_))));
}

#[test]
fn test_circuits_numbered_in_order() {
    let node = Node::new(make_config(
        "1.1",
        "LOCAL",
        NodeKind::L1Router,
        &[("ptp-0", CircuitKind::Ptp), ("lan-0", CircuitKind::Lan)],
    ))
    .unwrap();
    assert_eq!(node.circuit_id("ptp-0"), Some(CircuitId::new(1)));
    assert_eq!(node.circuit_id("lan-0"), Some(CircuitId::new(2)));
    assert_eq!(node.circuit_id("nope"), None);
    assert_eq!(node.circuit(CircuitId::new(2)).unwrap().kind(), CircuitKind::Lan);
}

#[test]
fn test_take_deliveries_once() {
    let mut node = make_node();
    assert!(node.take_deliveries().is_some());
    assert!(node.take_deliveries().is_none());
}

#[test]
fn test_loopback_delivery() {
    let mut node = make_node();
    let mut rx = node.take_deliveries().unwrap();

    node.originate(node_id("1.1"), b"me".to_vec(), false).unwrap();
    let d = rx.try_recv().unwrap();
    assert_eq!(d.src, node_id("1.1"));
    assert_eq!(d.payload, b"me");
    assert_eq!(node.counters().delivered, 1);
    assert_eq!(node.counters().originated, 1);
}

#[test]
fn test_originate_without_route() {
    let mut node = make_node();
    assert_eq!(node.route(node_id("1.7")), RouteDecision::Unreachable);
    assert!(matches!(
        node.originate(node_id("1.7"), vec![0], true),
        Err(NodeError::Unreachable(_))
    ));
    assert_eq!(node.counters().unreachable_loss, 1);
}

#[test]
fn test_out_of_range_destination() {
    let mut config = make_config("1.1", "LOCAL", NodeKind::L1Router, &[]);
    config.node.maxnodes = Some(100);
    let mut node = Node::new(config).unwrap();

    assert!(node.originate(node_id("1.200"), vec![0], false).is_err());
    assert_eq!(node.counters().out_of_range, 1);
}

#[test]
fn test_set_circuit_unknown() {
    let mut node = make_node();
    assert!(matches!(
        node.set_circuit("nope", true),
        Err(NodeError::CircuitNotFound(_))
    ));
}

#[test]
fn test_datalink_up_starts_router_timers() {
    let mut node = Node::new(make_config(
        "1.1",
        "LOCAL",
        NodeKind::L1Router,
        &[("ptp-0", CircuitKind::Ptp)],
    ))
    .unwrap();
    let id = CircuitId::new(1);
    node.process(WorkItem::Datalink(DatalinkEvent::Up(id)));

    assert!(node.timers.is_armed(&TimerToken::Hello(id)));
    assert!(node.timers.is_armed(&TimerToken::RouteUpdate(id)));

    node.process(WorkItem::Datalink(DatalinkEvent::Down(id)));
    assert!(!node.circuits[&id].datalink_up);
}

#[test]
fn test_endnode_has_no_route_timer() {
    let mut node = Node::new(make_config(
        "1.5",
        "LEAF",
        NodeKind::Endnode,
        &[("ptp-0", CircuitKind::Ptp)],
    ))
    .unwrap();
    let id = CircuitId::new(1);
    node.process(WorkItem::Datalink(DatalinkEvent::Up(id)));
    assert!(!node.timers.is_armed(&TimerToken::RouteUpdate(id)));
}

#[test]
fn test_unattached_circuit_discards_frames() {
    let mut node = Node::new(make_config(
        "1.1",
        "LOCAL",
        NodeKind::L1Router,
        &[("ptp-0", CircuitKind::Ptp)],
    ))
    .unwrap();
    // the Init goes nowhere without a datalink
    node.process(WorkItem::Datalink(DatalinkEvent::Up(CircuitId::new(1))));
    let snap = node.snapshot();
    assert_eq!(snap.circuits[0].frames_sent, 0);

    let mut rx = node.attach(CircuitId::new(1)).unwrap();
    node.advance(Duration::from_secs(3));
    assert!(rx.try_recv().is_ok());
}

#[test]
fn test_dr_change_schedules_route_update() {
    let mut node = Node::new(make_config(
        "1.1",
        "LOCAL",
        NodeKind::L1Router,
        &[("lan-0", CircuitKind::Lan)],
    ))
    .unwrap();
    let id = CircuitId::new(1);
    assert!(!node.timers.is_armed(&TimerToken::RouteHoldoff));

    node.apply(id, vec![CircuitEvent::DrChanged(Some(node_id("1.2")))]);
    assert!(node.timers.is_armed(&TimerToken::RouteHoldoff));
}
