use super::*;
use crate::config::{CircuitKind, NodeEntry, NodeKind};
use crate::datalink::{OutboundFrame, ReceivedFrame};
use crate::identity::MacAddr;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

mod unit;

pub(super) fn node_id(s: &str) -> NodeId {
    s.parse().unwrap()
}

/// A node config with short hello timers so tests converge quickly.
pub(super) fn make_config(id: &str, name: &str, kind: NodeKind, circuits: &[(&str, CircuitKind)]) -> Config {
    let mut config = Config::new();
    config.node.id = Some(node_id(id));
    config.node.name = Some(name.to_string());
    config.node.kind = Some(kind);
    for (circuit, ckind) in circuits {
        let mut c = CircuitConfig::new(circuit, *ckind);
        c.t3 = Some(2);
        config.circuits.push(c);
    }
    config
}

pub(super) fn make_node() -> Node {
    Node::new(make_config("1.1", "LOCAL", NodeKind::L1Router, &[])).unwrap()
}

pub(super) fn add_known(config: &mut Config, id: &str, name: &str) {
    config.nodes.push(NodeEntry::new(node_id(id), name));
}

/// One end of a simulated wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct Port {
    pub node: usize,
    pub circuit: CircuitId,
}

struct Wire {
    ports: Vec<Port>,
    cut: bool,
}

/// A set of nodes joined by in-memory wires.
///
/// Frames a node queues on a circuit are carried to the other ports of
/// that circuit's wire and fed back in as datalink events. Timers move
/// only when the test calls [`TestNet::run`].
pub(super) struct TestNet {
    pub nodes: Vec<Node>,
    queues: Vec<BTreeMap<CircuitId, FrameRx>>,
    deliveries: Vec<UnboundedReceiver<Delivery>>,
    wires: Vec<Wire>,
}

impl TestNet {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            queues: Vec::new(),
            deliveries: Vec::new(),
            wires: Vec::new(),
        }
    }

    pub fn add(&mut self, config: Config) -> usize {
        let mut node = Node::new(config).unwrap();
        let ids: Vec<CircuitId> = node.circuits.keys().copied().collect();
        let mut queues = BTreeMap::new();
        for id in ids {
            queues.insert(id, node.attach(id).unwrap());
        }
        self.deliveries.push(node.take_deliveries().unwrap());
        self.queues.push(queues);
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn port(&self, node: usize, circuit: &str) -> Port {
        Port {
            node,
            circuit: self.nodes[node].circuit_id(circuit).unwrap(),
        }
    }

    /// Join circuits into one wire: two ports for point-to-point, any
    /// number for a LAN.
    pub fn connect(&mut self, ports: &[(usize, &str)]) {
        let ports = ports.iter().map(|(n, c)| self.port(*n, c)).collect();
        self.wires.push(Wire { ports, cut: false });
    }

    pub fn id(&self, node: usize) -> NodeId {
        self.nodes[node].local().id()
    }

    /// Report every datalink up and carry the resulting frames.
    pub fn start(&mut self) {
        for node in &mut self.nodes {
            let ids: Vec<CircuitId> = node.circuits.keys().copied().collect();
            for id in ids {
                node.process(WorkItem::Datalink(DatalinkEvent::Up(id)));
            }
        }
        self.settle();
    }

    /// Sever the wire carrying `circuit` on `node` and report the
    /// datalink down at every end.
    pub fn cut(&mut self, node: usize, circuit: &str) {
        let port = self.port(node, circuit);
        let mut ends = Vec::new();
        for wire in &mut self.wires {
            if wire.ports.contains(&port) {
                wire.cut = true;
                ends.extend(wire.ports.iter().copied());
            }
        }
        for end in ends {
            self.nodes[end.node].process(WorkItem::Datalink(DatalinkEvent::Down(end.circuit)));
        }
        self.settle();
    }

    /// Carry frames until every queue is empty.
    pub fn settle(&mut self) {
        for _ in 0..10_000 {
            let mut pending = Vec::new();
            for (node, queues) in self.queues.iter_mut().enumerate() {
                for (circuit, rx) in queues.iter_mut() {
                    while let Ok(frame) = rx.try_recv() {
                        pending.push((Port { node, circuit: *circuit }, frame));
                    }
                }
            }
            if pending.is_empty() {
                return;
            }
            for (from, frame) in pending {
                self.carry(from, frame);
            }
        }
        panic!("network did not settle");
    }

    fn carry(&mut self, from: Port, frame: OutboundFrame) {
        let src = self.nodes[from.node].local().station();
        let mut targets = Vec::new();
        for wire in self.wires.iter().filter(|w| !w.cut && w.ports.contains(&from)) {
            for port in wire.ports.iter().filter(|p| **p != from) {
                let node = &self.nodes[port.node];
                if node.circuit(port.circuit).unwrap().kind() == CircuitKind::Ptp {
                    targets.push((port.node, ReceivedFrame::new(port.circuit, None, frame.data.clone())));
                    continue;
                }
                let accept = match frame.dst {
                    Some(dst) if dst == MacAddr::ALL_ROUTERS => node.local().is_router(),
                    Some(dst) if dst == MacAddr::ALL_ENDNODES => !node.local().is_router(),
                    Some(dst) => dst == node.local().station(),
                    None => false,
                };
                if accept {
                    targets.push((port.node, ReceivedFrame::new(port.circuit, Some(src), frame.data.clone())));
                }
            }
        }
        for (node, received) in targets {
            self.nodes[node].process(WorkItem::Datalink(DatalinkEvent::Frame(received)));
        }
    }

    /// Let `elapsed` pass on every node, one timer tick at a time,
    /// carrying frames after each tick.
    pub fn run(&mut self, elapsed: Duration) {
        let tick = self.nodes[0].timers.tick();
        let ticks = elapsed.as_nanos() / tick.as_nanos();
        for _ in 0..ticks {
            for node in &mut self.nodes {
                node.tick_timers();
            }
            self.settle();
        }
    }

    /// Originate a packet and carry it to wherever it goes.
    pub fn send(&mut self, from: usize, dst: NodeId, payload: &[u8], rqr: bool) -> Result<(), NodeError> {
        let result = self.nodes[from].originate(dst, payload.to_vec(), rqr);
        self.settle();
        result
    }

    /// Data delivered to `node` since the last call.
    pub fn delivered(&mut self, node: usize) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Ok(d) = self.deliveries[node].try_recv() {
            out.push(d);
        }
        out
    }
}
