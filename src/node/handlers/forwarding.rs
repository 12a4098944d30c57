//! Data packet delivery, forwarding and origination.
//!
//! Arriving data is delivered when addressed to this node; routers
//! forward everything else with the visit count incremented. A packet
//! that cannot be routed goes back to its sender if it asked for that
//! and is not already returning; otherwise it is dropped and counted.

use crate::circuit::{Adjacency, CircuitId, InboundData};
use crate::compat::{encode_data, is_aged};
use crate::config::CircuitKind;
use crate::identity::{MacAddr, NodeId, NodeType, Phase};
use crate::node::{Delivery, Node, NodeError};
use crate::protocol::DataHeader;
use crate::routing::RouteDecision;
use tracing::{debug, info, trace, warn};

/// Result of handing a packet to the send path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(in crate::node) enum Outcome {
    Sent,
    Unreachable,
}

impl Node {
    /// Routing decision for `dst`, as the layer above sees it.
    pub fn route(&self, dst: NodeId) -> RouteDecision {
        self.routing.route(dst)
    }

    pub(in crate::node) fn handle_inbound_data(&mut self, id: CircuitId, data: InboundData) {
        let InboundData {
            neighbor,
            header,
            payload,
            ..
        } = data;
        if header.dstnode == self.local.id() {
            self.deliver(&header, payload);
            return;
        }
        if !self.local.is_router() {
            trace!(circuit = %id, dst = %header.dstnode, "Endnode dropping transit packet");
            return;
        }
        trace!(circuit = %id, neighbor = %neighbor, dst = %header.dstnode, "Forwarding");
        self.forward(header, &payload);
    }

    fn deliver(&mut self, header: &DataHeader, payload: Vec<u8>) {
        self.counters.delivered += 1;
        let delivery = Delivery {
            src: header.srcnode,
            rts: header.rts,
            payload,
        };
        if self.delivery_tx.send(delivery).is_err() {
            trace!(src = %header.srcnode, "No receiver for delivered data");
        }
    }

    /// Forward a packet received from a neighbor.
    pub(in crate::node) fn forward(&mut self, mut header: DataHeader, payload: &[u8]) {
        header.visit = header.visit.saturating_add(1);
        if is_aged(&header, self.local.limits().maxvisits) {
            self.counters.aged_loss += 1;
            warn!(
                src = %header.srcnode,
                dst = %header.dstnode,
                visit = header.visit,
                "Aged packet loss"
            );
            return;
        }
        match self.route_packet(&header, payload) {
            Outcome::Sent => self.counters.forwarded += 1,
            Outcome::Unreachable => self.unreachable(header, payload),
        }
    }

    /// Originate a packet from this node.
    pub(in crate::node) fn originate(
        &mut self,
        dst: NodeId,
        payload: Vec<u8>,
        rqr: bool,
    ) -> Result<(), NodeError> {
        let header = DataHeader::new(self.local.id(), dst, rqr);
        self.counters.originated += 1;
        if dst == self.local.id() {
            self.deliver(&header, payload);
            return Ok(());
        }
        match self.route_packet(&header, &payload) {
            Outcome::Sent => Ok(()),
            Outcome::Unreachable => {
                self.counters.unreachable_loss += 1;
                debug!(dst = %dst, "No route for originated packet");
                Err(NodeError::Unreachable(dst))
            }
        }
    }

    fn unreachable(&mut self, mut header: DataHeader, payload: &[u8]) {
        if header.rqr && !header.rts {
            std::mem::swap(&mut header.srcnode, &mut header.dstnode);
            header.rts = true;
            header.rqr = false;
            self.counters.returned += 1;
            debug!(src = %header.srcnode, dst = %header.dstnode, "Returning packet to sender");
            if header.dstnode == self.local.id() {
                self.deliver(&header, payload.to_vec());
                return;
            }
            if self.route_packet(&header, payload) == Outcome::Sent {
                return;
            }
        }
        self.counters.unreachable_loss += 1;
        info!(
            src = %header.srcnode,
            dst = %header.dstnode,
            "Node unreachable packet loss"
        );
    }

    /// True if `dst` fits in our routing tables.
    fn in_range(&self, dst: NodeId) -> bool {
        let limits = self.local.limits();
        if dst.area() == self.local.area() || dst.area() == 0 {
            dst.node() <= limits.maxnodes
        } else {
            dst.area() <= limits.maxarea
        }
    }

    /// Hand a packet to the next hop for its destination.
    pub(in crate::node) fn route_packet(&mut self, header: &DataHeader, payload: &[u8]) -> Outcome {
        if !self.in_range(header.dstnode) {
            self.counters.out_of_range += 1;
            info!(dst = %header.dstnode, "Packet out of range");
            return Outcome::Unreachable;
        }
        match self.routing.route(header.dstnode) {
            RouteDecision::Local => {
                self.deliver(header, payload.to_vec());
                Outcome::Sent
            }
            RouteDecision::Forward { circuit, neighbor } => {
                self.transmit(circuit, neighbor, header, payload)
            }
            // an endnode without a router assumes the destination shares its LAN
            RouteDecision::Unreachable if !self.local.is_router() => {
                self.send_on_lan(header, payload)
            }
            RouteDecision::Unreachable => Outcome::Unreachable,
        }
    }

    fn transmit(
        &mut self,
        id: CircuitId,
        neighbor: NodeId,
        header: &DataHeader,
        payload: &[u8],
    ) -> Outcome {
        let Some(slot) = self.circuits.get(&id) else {
            return Outcome::Unreachable;
        };
        let Some(adj) = slot.circuit.adjacency(neighbor).cloned() else {
            return Outcome::Unreachable;
        };
        if adj.phase == Phase::Phase2 {
            return self.transmit_phase2(id, &adj, header, payload);
        }

        let kind = slot.circuit.kind();
        let station = slot.circuit.next_station(header.dstnode, neighbor);
        let ie = kind == CircuitKind::Lan
            && (neighbor == header.dstnode
                || station == Some(MacAddr::from_node(header.dstnode)));
        let Some(data) = encode_data(&self.local, &adj, kind, header, ie, payload) else {
            debug!(
                circuit = %id,
                neighbor = %neighbor,
                dst = %header.dstnode,
                "Destination not addressable through neighbor"
            );
            return Outcome::Unreachable;
        };
        self.queue_frame(id, station, data);
        Outcome::Sent
    }

    fn send_on_lan(&mut self, header: &DataHeader, payload: &[u8]) -> Outcome {
        let Some((id, blksize)) = self
            .circuits
            .iter()
            .find(|(_, s)| s.circuit.kind() == CircuitKind::Lan && s.circuit.state().is_up())
            .map(|(id, s)| (*id, s.circuit.params().blksize))
        else {
            return Outcome::Unreachable;
        };
        let adj = Adjacency::new(id, header.dstnode, NodeType::Endnode, Phase::Phase4, blksize);
        let Some(data) = encode_data(&self.local, &adj, CircuitKind::Lan, header, true, payload)
        else {
            return Outcome::Unreachable;
        };
        self.queue_frame(id, Some(MacAddr::from_node(header.dstnode)), data);
        Outcome::Sent
    }
}
