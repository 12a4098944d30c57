//! Routing message transmission.

use std::time::Duration;

use crate::circuit::CircuitId;
use crate::config::CircuitKind;
use crate::identity::{MacAddr, NodeType, Phase};
use crate::node::Node;
use crate::routing::{l1_messages, l2_messages, phase3_message};
use tracing::trace;

impl Node {
    /// Background routing message interval for a circuit kind.
    pub(in crate::node) fn route_interval(&self, kind: CircuitKind) -> Duration {
        match kind {
            CircuitKind::Ptp => self.config.node.t1(),
            CircuitKind::Lan => self.config.node.bct1(),
        }
    }

    /// Send our current vectors on one circuit.
    ///
    /// LAN circuits get level 1 (and, on area routers, level 2) messages
    /// to all routers. A point-to-point circuit gets messages only while
    /// its neighbor is an up router, in the form its phase understands.
    pub(in crate::node) fn send_routing_messages(&mut self, id: CircuitId) {
        if !self.local.is_router() {
            return;
        }
        let Some(slot) = self.circuits.get(&id) else {
            return;
        };
        if !slot.circuit.state().is_up() {
            return;
        }

        let local_id = self.local.id();
        let area_router = self.local.is_area_router();
        let params = slot.circuit.params();
        let mut frames: Vec<(Option<MacAddr>, Vec<u8>)> = Vec::new();

        match params.kind {
            CircuitKind::Lan => {
                let dst = Some(MacAddr::ALL_ROUTERS);
                for msg in l1_messages(&self.routing, local_id, params.blksize) {
                    frames.push((dst, msg));
                }
                if area_router {
                    for msg in l2_messages(&self.routing, local_id, params.blksize) {
                        frames.push((dst, msg));
                    }
                }
            }
            CircuitKind::Ptp => {
                let adjacencies = slot.circuit.adjacencies();
                let Some(adj) = adjacencies.iter().find(|a| a.is_up() && a.is_router()) else {
                    return;
                };
                let blksize = adj.blksize.min(params.blksize);
                match adj.phase {
                    Phase::Phase4 => {
                        if adj.neighbor.area() == self.local.area() {
                            for msg in l1_messages(&self.routing, local_id, blksize) {
                                frames.push((None, msg));
                            }
                        }
                        if area_router && adj.node_type == NodeType::Level2Router {
                            for msg in l2_messages(&self.routing, local_id, blksize) {
                                frames.push((None, msg));
                            }
                        }
                    }
                    Phase::Phase3 => frames.push((None, phase3_message(&self.routing, local_id))),
                    Phase::Phase2 => {}
                }
            }
        }

        trace!(circuit = %id, messages = frames.len(), "Sending routing messages");
        for (dst, data) in frames {
            self.queue_frame(id, dst, data);
        }
    }

    /// Send routing messages on every circuit.
    pub(in crate::node) fn send_all_routing_messages(&mut self) {
        let ids: Vec<CircuitId> = self.circuits.keys().copied().collect();
        for id in ids {
            self.send_routing_messages(id);
        }
    }
}
