//! Work item dispatch and application of circuit events.

use crate::circuit::{Adjacency, CircuitCtx, CircuitEvent, CircuitId, DownReason, TimerToken, T2};
use crate::datalink::{DatalinkEvent, OutboundFrame, ReceivedFrame, SendOutcome};
use crate::identity::{MacAddr, NodeId};
use crate::node::{Node, WorkItem};
use tracing::{debug, trace, warn};

impl Node {
    /// Apply one work item.
    ///
    /// Runs to completion without suspending. Nothing that happens while
    /// handling an item (malformed frame, rejected neighbor, unreachable
    /// destination) is an error for the dispatcher.
    pub fn process(&mut self, item: WorkItem) {
        match item {
            WorkItem::Datalink(event) => self.handle_datalink_event(event),
            WorkItem::Timer(token) => self.handle_timer(token),
            WorkItem::Control(request) => self.handle_control(request),
        }
        self.check_route_changes();
    }

    fn handle_datalink_event(&mut self, event: DatalinkEvent) {
        match event {
            DatalinkEvent::Frame(frame) => self.handle_frame(frame),
            DatalinkEvent::Up(id) => self.handle_datalink_up(id),
            DatalinkEvent::Down(id) => self.handle_datalink_down(id),
            DatalinkEvent::SendFailed { circuit, error } => {
                debug!(circuit = %circuit, error = %error, "Datalink send failed");
            }
        }
    }

    fn handle_frame(&mut self, frame: ReceivedFrame) {
        let id = frame.circuit;
        let Some(slot) = self.circuits.get_mut(&id) else {
            trace!(circuit = %id, "Frame for unknown circuit");
            return;
        };
        let ctx = CircuitCtx {
            local: &self.local,
            nodes: &self.nodes,
            intercept: self.intercept,
        };
        let mut out = Vec::new();
        slot.circuit.receive(&ctx, &frame, &mut out);
        self.apply(id, out);
    }

    fn handle_datalink_up(&mut self, id: CircuitId) {
        let Some(slot) = self.circuits.get_mut(&id) else {
            return;
        };
        slot.datalink_up = true;
        if slot.enabled {
            self.start_circuit(id);
        } else {
            debug!(circuit = %slot.config.name, "Datalink up, circuit disabled");
        }
    }

    fn handle_datalink_down(&mut self, id: CircuitId) {
        let Some(slot) = self.circuits.get_mut(&id) else {
            return;
        };
        slot.datalink_up = false;
        let ctx = CircuitCtx {
            local: &self.local,
            nodes: &self.nodes,
            intercept: self.intercept,
        };
        let mut out = Vec::new();
        slot.circuit.datalink_down(&ctx, &mut out);
        self.apply(id, out);
    }

    // === Circuit Control ===

    pub(in crate::node) fn start_circuit(&mut self, id: CircuitId) {
        let Some(slot) = self.circuits.get_mut(&id) else {
            return;
        };
        let ctx = CircuitCtx {
            local: &self.local,
            nodes: &self.nodes,
            intercept: self.intercept,
        };
        let mut out = Vec::new();
        slot.circuit.start(&ctx, &mut out);
        let kind = slot.circuit.kind();
        self.apply(id, out);
        if self.local.is_router() {
            let interval = self.route_interval(kind);
            self.timers.start(TimerToken::RouteUpdate(id), interval);
        }
    }

    /// Halt a circuit and withdraw everything learned over it, in this
    /// work item.
    pub(in crate::node) fn stop_circuit(&mut self, id: CircuitId, reason: DownReason) {
        let Some(slot) = self.circuits.get_mut(&id) else {
            return;
        };
        let mut out = Vec::new();
        slot.circuit.stop(reason, &mut out);
        self.apply(id, out);
        self.timers.cancel_where(|t| t.circuit() == Some(id));
        self.routing.circuit_down(id);
    }

    // === Circuit Events ===

    /// Apply the outputs of a circuit state machine, in order.
    pub(in crate::node) fn apply(&mut self, id: CircuitId, events: Vec<CircuitEvent>) {
        for event in events {
            match event {
                CircuitEvent::Send { dst, data } => self.queue_frame(id, dst, data),
                CircuitEvent::StartTimer(token, timeout) => {
                    self.timers.start(token, timeout);
                }
                CircuitEvent::CancelTimer(token) => {
                    self.timers.cancel(&token);
                }
                CircuitEvent::AdjacencyUp(adj) => self.handle_adjacency_up(id, adj),
                CircuitEvent::AdjacencyDown { neighbor, reason } => {
                    self.handle_adjacency_down(id, neighbor, reason)
                }
                CircuitEvent::Rejected { neighbor, reason } => {
                    trace!(circuit = %id, neighbor = ?neighbor, reason = %reason, "Neighbor rejected");
                }
                CircuitEvent::DrChanged(dr) => self.handle_dr_changed(id, dr),
                CircuitEvent::Routing {
                    neighbor,
                    level,
                    entries,
                } => self.routing.update(id, neighbor, level, &entries),
                CircuitEvent::Data(data) => self.handle_inbound_data(id, data),
                CircuitEvent::Phase2Frame { neighbor, frame } => {
                    self.handle_phase2_frame(id, neighbor, frame)
                }
            }
        }
    }

    fn handle_adjacency_up(&mut self, id: CircuitId, adj: Adjacency) {
        let Some(slot) = self.circuits.get(&id) else {
            return;
        };
        let cost = slot.circuit.params().cost;
        self.routing.adjacency_up(&adj, cost);
        if adj.is_router() && self.local.is_router() {
            // a new router neighbor needs our full vector
            self.schedule_route_update();
        }
    }

    fn handle_adjacency_down(&mut self, id: CircuitId, neighbor: NodeId, reason: DownReason) {
        debug!(circuit = %id, neighbor = %neighbor, reason = %reason, "Withdrawing adjacency");
        self.routing.adjacency_down(id, neighbor);
        self.timers.cancel(&TimerToken::Listen {
            circuit: id,
            neighbor,
        });
        for key in self.relays.remove_neighbor(neighbor) {
            self.timers.cancel(&TimerToken::Relay(key));
        }
    }

    /// Queue a frame without waiting; a full queue drops it.
    pub(in crate::node) fn queue_frame(&mut self, id: CircuitId, dst: Option<MacAddr>, data: Vec<u8>) {
        let Some(slot) = self.circuits.get_mut(&id) else {
            return;
        };
        match slot.queue.push(OutboundFrame { dst, data }) {
            SendOutcome::Queued => {}
            SendOutcome::Dropped => {
                warn!(circuit = %slot.config.name, "Send queue full, frame dropped");
            }
            SendOutcome::Closed => {
                trace!(circuit = %slot.config.name, "No datalink attached, frame discarded");
            }
        }
    }

    fn handle_dr_changed(&mut self, id: CircuitId, dr: Option<NodeId>) {
        self.routing.designated_router_changed(id, dr);
        if self.local.is_router() {
            self.schedule_route_update();
        }
    }

    // === Routing Changes ===

    fn check_route_changes(&mut self) {
        if self.routing.take_changed() && self.local.is_router() {
            self.schedule_route_update();
        }
    }

    /// Send routing messages on every circuit after the T2 holdoff,
    /// unless an update is already pending.
    pub(in crate::node) fn schedule_route_update(&mut self) {
        if !self.timers.is_armed(&TimerToken::RouteHoldoff) {
            self.timers.start(TimerToken::RouteHoldoff, T2);
        }
    }
}
