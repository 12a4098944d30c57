//! Node lifecycle management: start, stop, and circuit administration.

use super::{Node, NodeError, NodeState};
use crate::circuit::{CircuitId, DownReason};
use crate::datalink::udp::UdpDatalink;
use crate::identity::MacAddr;
use tracing::{debug, info, warn};

impl Node {
    /// Start a UDP datalink for every configured circuit.
    ///
    /// A datalink that fails to start leaves its circuit halted; the node
    /// still runs on the others. Each datalink reports itself up through
    /// the event channel, and the dispatcher starts the circuit when it
    /// sees that event.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        if !self.state.can_start() {
            return Err(NodeError::AlreadyStarted);
        }
        self.state = NodeState::Starting;

        let station = self.local.station();
        let groups = if self.local.is_router() {
            vec![MacAddr::ALL_ROUTERS]
        } else {
            vec![MacAddr::ALL_ENDNODES]
        };
        let ids: Vec<CircuitId> = self.circuits.keys().copied().collect();

        for id in ids {
            let Some(frames) = self.attach(id) else {
                continue;
            };
            let Some(slot) = self.circuits.get(&id) else {
                continue;
            };
            let mut datalink = UdpDatalink::new(
                id,
                &slot.config.name,
                slot.config.kind,
                slot.config.udp.clone(),
                station,
                groups.clone(),
                slot.config.blksize(),
                self.event_tx.clone(),
            );
            match datalink.start_async(frames).await {
                Ok(()) => self.datalinks.push(datalink),
                Err(e) => {
                    warn!(circuit = %slot.config.name, error = %e, "Datalink failed to start");
                }
            }
        }

        if !self.datalinks.is_empty() {
            info!(count = self.datalinks.len(), "Datalinks initialized");
        }

        self.state = NodeState::Running;
        info!(
            node = %self.local.id(),
            name = %self.local.name(),
            node_type = %self.local.node_type(),
            "Node started"
        );
        Ok(())
    }

    /// Halt every circuit and shut down the datalinks.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        if !self.state.can_stop() {
            return Err(NodeError::NotStarted);
        }
        self.state = NodeState::Stopping;
        info!(state = %self.state, "Node stopping");

        let ids: Vec<CircuitId> = self.circuits.keys().copied().collect();
        for id in ids {
            self.stop_circuit(id, DownReason::Administrative);
        }

        for mut datalink in self.datalinks.drain(..) {
            if let Err(e) = datalink.stop_async().await {
                warn!(circuit = %datalink.circuit(), error = %e, "Datalink stop failed");
            }
        }

        self.state = NodeState::Stopped;
        info!(state = %self.state, "Node stopped");
        Ok(())
    }

    /// Administratively enable or disable a circuit.
    ///
    /// Disabling halts the circuit and withdraws its adjacencies at once.
    /// Enabling starts it if its datalink is up.
    pub fn set_circuit(&mut self, name: &str, enabled: bool) -> Result<(), NodeError> {
        let id = self
            .circuit_id(name)
            .ok_or_else(|| NodeError::CircuitNotFound(name.to_string()))?;
        let Some(slot) = self.circuits.get_mut(&id) else {
            return Err(NodeError::CircuitNotFound(name.to_string()));
        };
        if slot.enabled == enabled {
            return Ok(());
        }
        slot.enabled = enabled;
        let datalink_up = slot.datalink_up;
        info!(circuit = %name, enabled, "Circuit state change");

        if enabled {
            if datalink_up {
                self.start_circuit(id);
            } else {
                debug!(circuit = %name, "Waiting for datalink");
            }
        } else {
            self.stop_circuit(id, DownReason::Administrative);
        }
        Ok(())
    }
}
