//! Control API: requests answered by the dispatcher.
//!
//! Callers outside the dispatcher never touch node state. Each call
//! becomes a [`ControlRequest`] work item carrying a oneshot reply
//! channel, so a query observes the state between two work items.

use std::fmt;

use tokio::sync::{mpsc, oneshot};

use super::{NodeError, NodeSnapshot};
use crate::identity::NodeId;
use crate::routing::{ReachabilityEvent, RouteDecision};

/// A request for the dispatcher.
pub enum ControlRequest {
    Route {
        dst: NodeId,
        reply: oneshot::Sender<RouteDecision>,
    },
    Snapshot {
        reply: oneshot::Sender<NodeSnapshot>,
    },
    /// Originate a data packet.
    Send {
        dst: NodeId,
        payload: Vec<u8>,
        /// Ask for the packet back if the destination is unreachable.
        rqr: bool,
        reply: oneshot::Sender<Result<(), NodeError>>,
    },
    Subscribe {
        reply: oneshot::Sender<mpsc::UnboundedReceiver<ReachabilityEvent>>,
    },
    SetCircuit {
        name: String,
        enabled: bool,
        reply: oneshot::Sender<Result<(), NodeError>>,
    },
    /// Stop the dispatcher loop.
    Shutdown,
}

impl fmt::Debug for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlRequest::Route { dst, .. } => write!(f, "Route({})", dst),
            ControlRequest::Snapshot { .. } => write!(f, "Snapshot"),
            ControlRequest::Send { dst, payload, .. } => {
                write!(f, "Send({}, {} bytes)", dst, payload.len())
            }
            ControlRequest::Subscribe { .. } => write!(f, "Subscribe"),
            ControlRequest::SetCircuit { name, enabled, .. } => {
                write!(f, "SetCircuit({}, {})", name, enabled)
            }
            ControlRequest::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Cloneable handle to a node's dispatcher.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    tx: mpsc::Sender<ControlRequest>,
}

impl NodeHandle {
    pub(super) fn new(tx: mpsc::Sender<ControlRequest>) -> Self {
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
    ) -> Result<T, NodeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| NodeError::Stopped)?;
        rx.await.map_err(|_| NodeError::Stopped)
    }

    /// Next hop for `dst`.
    pub async fn route(&self, dst: NodeId) -> Result<RouteDecision, NodeError> {
        self.request(|reply| ControlRequest::Route { dst, reply }).await
    }

    /// Circuits, adjacencies and routing tables as of now.
    pub async fn snapshot(&self) -> Result<NodeSnapshot, NodeError> {
        self.request(|reply| ControlRequest::Snapshot { reply }).await
    }

    /// Send `payload` to `dst`.
    pub async fn send(&self, dst: NodeId, payload: Vec<u8>, rqr: bool) -> Result<(), NodeError> {
        self.request(|reply| ControlRequest::Send {
            dst,
            payload,
            rqr,
            reply,
        })
        .await?
    }

    /// Reachability transitions from now on.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<ReachabilityEvent>, NodeError> {
        self.request(|reply| ControlRequest::Subscribe { reply }).await
    }

    pub async fn enable_circuit(&self, name: &str) -> Result<(), NodeError> {
        self.set_circuit(name, true).await
    }

    pub async fn disable_circuit(&self, name: &str) -> Result<(), NodeError> {
        self.set_circuit(name, false).await
    }

    async fn set_circuit(&self, name: &str, enabled: bool) -> Result<(), NodeError> {
        let name = name.to_string();
        self.request(|reply| ControlRequest::SetCircuit {
            name,
            enabled,
            reply,
        })
        .await?
    }

    /// Ask the dispatcher loop to exit.
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        self.tx
            .send(ControlRequest::Shutdown)
            .await
            .map_err(|_| NodeError::Stopped)
    }
}
