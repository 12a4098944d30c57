//! Control request handling.

use crate::node::{ControlRequest, Node};
use tracing::debug;

impl Node {
    /// Answer a control request. A caller that gave up waiting is not an
    /// error.
    pub(in crate::node) fn handle_control(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Route { dst, reply } => {
                let _ = reply.send(self.route(dst));
            }
            ControlRequest::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            ControlRequest::Send {
                dst,
                payload,
                rqr,
                reply,
            } => {
                let _ = reply.send(self.originate(dst, payload, rqr));
            }
            ControlRequest::Subscribe { reply } => {
                let _ = reply.send(self.routing.subscribe());
            }
            ControlRequest::SetCircuit {
                name,
                enabled,
                reply,
            } => {
                let _ = reply.send(self.set_circuit(&name, enabled));
            }
            // the run loop intercepts shutdown before it gets here
            ControlRequest::Shutdown => debug!("Shutdown request outside the run loop"),
        }
    }
}
