//! Phase II neighbors: intercept receive and send, relay table upkeep.

use super::forwarding::Outcome;
use crate::circuit::{Adjacency, CircuitId, TimerToken};
use crate::compat::{
    phase2_receive, phase2_send, InterceptRole, Phase2Inbound, Phase2Link, Phase2Outbound,
    RelayAction,
};
use crate::identity::NodeId;
use crate::node::Node;
use crate::protocol::DataHeader;
use tracing::{debug, trace};

impl Node {
    pub(in crate::node) fn handle_phase2_frame(
        &mut self,
        id: CircuitId,
        neighbor: NodeId,
        frame: Vec<u8>,
    ) {
        let Some(adj) = self
            .circuits
            .get(&id)
            .and_then(|s| s.circuit.adjacency(neighbor))
            .cloned()
        else {
            return;
        };
        let link = Phase2Link {
            local: &self.local,
            nodes: &self.nodes,
            adj: &adj,
            role: InterceptRole::negotiate(self.intercept, adj.int, adj.rint),
        };
        let (inbound, action) = phase2_receive(&link, &self.relays, &frame);
        if let Some(action) = action {
            self.apply_relay(action);
        }
        match inbound {
            Phase2Inbound::Data { header, payload } => {
                if header.dstnode == self.local.id() || !self.local.is_router() {
                    self.handle_inbound_data(
                        id,
                        crate::circuit::InboundData {
                            neighbor,
                            station: None,
                            header,
                            ie: false,
                            payload,
                        },
                    );
                } else {
                    self.forward(header, &payload);
                }
            }
            Phase2Inbound::Reply(reply) => self.queue_frame(id, None, reply),
            Phase2Inbound::Discard => trace!(circuit = %id, neighbor = %neighbor, "Phase II frame discarded"),
        }
    }

    pub(in crate::node) fn transmit_phase2(
        &mut self,
        id: CircuitId,
        adj: &Adjacency,
        header: &DataHeader,
        payload: &[u8],
    ) -> Outcome {
        let link = Phase2Link {
            local: &self.local,
            nodes: &self.nodes,
            adj,
            role: InterceptRole::negotiate(self.intercept, adj.int, adj.rint),
        };
        let (out, actions) = phase2_send(&link, header, payload);
        for action in actions {
            self.apply_relay(action);
        }
        match out {
            Phase2Outbound::Frame(frame) => {
                self.queue_frame(id, None, frame);
                Outcome::Sent
            }
            Phase2Outbound::Unreachable => Outcome::Unreachable,
            Phase2Outbound::Discard => Outcome::Sent,
        }
    }

    fn apply_relay(&mut self, action: RelayAction) {
        let timeout = self.config.node.relay_timeout();
        match action {
            RelayAction::Open(key, dst) => {
                debug!(neighbor = %key.neighbor, link = key.link, dst = %dst, "Intercept relay opened");
                self.relays.insert(key, dst);
                self.timers.start(TimerToken::Relay(key), timeout);
            }
            RelayAction::Close(key) => {
                if self.relays.remove(&key).is_some() {
                    debug!(neighbor = %key.neighbor, link = key.link, "Intercept relay closed");
                    self.timers.cancel(&TimerToken::Relay(key));
                }
            }
            RelayAction::Touch(key) => {
                self.timers.start(TimerToken::Relay(key), timeout);
            }
        }
    }
}
