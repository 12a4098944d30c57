//! UDP Datalink Implementation
//!
//! Carries one circuit's frames over a UDP socket. Point-to-point circuits
//! exchange raw frames with a single peer; LAN circuits add the station
//! header and send every frame to all peers, delivering inbound frames
//! addressed to this station or to a multicast group it listens to.
//!
//! A point-to-point circuit without a configured peer answers whoever
//! sends to it first. A LAN circuit adds unknown senders to its peers.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{
    decode_lan_frame, encode_lan_frame, DatalinkError, DatalinkEvent, DatalinkState, EventTx,
    FrameRx, OutboundFrame, ReceivedFrame, LAN_HEADER_LEN,
};
use crate::circuit::CircuitId;
use crate::config::{CircuitKind, UdpLinkConfig};
use crate::identity::MacAddr;

/// Receive buffer headroom over the block size.
const RECV_HEADROOM: usize = 128;

type Peers = Arc<RwLock<Vec<SocketAddr>>>;

/// UDP datalink for one circuit.
pub struct UdpDatalink {
    circuit: CircuitId,
    name: String,
    kind: CircuitKind,
    config: UdpLinkConfig,
    /// Our station address (LAN only).
    station: MacAddr,
    /// Multicast groups delivered to us (LAN only).
    groups: Vec<MacAddr>,
    blksize: usize,
    state: DatalinkState,
    event_tx: EventTx,
    peers: Peers,
    local_addr: Option<SocketAddr>,
    recv_task: Option<JoinHandle<()>>,
    send_task: Option<JoinHandle<()>>,
}

impl UdpDatalink {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        circuit: CircuitId,
        name: &str,
        kind: CircuitKind,
        config: UdpLinkConfig,
        station: MacAddr,
        groups: Vec<MacAddr>,
        blksize: u16,
        event_tx: EventTx,
    ) -> Self {
        Self {
            circuit,
            name: name.to_string(),
            kind,
            config,
            station,
            groups,
            blksize: blksize as usize,
            state: DatalinkState::Configured,
            event_tx,
            peers: Arc::new(RwLock::new(Vec::new())),
            local_addr: None,
            recv_task: None,
            send_task: None,
        }
    }

    pub fn circuit(&self) -> CircuitId {
        self.circuit
    }

    pub fn state(&self) -> DatalinkState {
        self.state
    }

    /// Get the local bound address (only valid after start).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the socket, spawn the receive and send loops, and report the
    /// circuit up.
    pub async fn start_async(&mut self, frames: FrameRx) -> Result<(), DatalinkError> {
        if !self.state.can_start() {
            return Err(DatalinkError::AlreadyStarted);
        }

        let bind_addr: SocketAddr = self
            .config
            .bind()
            .parse()
            .map_err(|e| DatalinkError::InvalidAddress(format!("{}: {}", self.config.bind(), e)))?;
        let mut peers = Vec::with_capacity(self.config.peers.len());
        for peer in &self.config.peers {
            let addr: SocketAddr = peer
                .parse()
                .map_err(|e| DatalinkError::InvalidAddress(format!("{}: {}", peer, e)))?;
            peers.push(addr);
        }
        *self.peers.write().await = peers;

        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(s) => s,
            Err(e) => {
                self.state = DatalinkState::Failed;
                return Err(DatalinkError::StartFailed(format!("bind failed: {}", e)));
            }
        };
        let local_addr = socket.local_addr()?;
        self.local_addr = Some(local_addr);
        let socket = Arc::new(socket);

        let rx = ReceiveLoop {
            socket: socket.clone(),
            circuit: self.circuit,
            kind: self.kind,
            station: self.station,
            groups: self.groups.clone(),
            peers: self.peers.clone(),
            event_tx: self.event_tx.clone(),
            bufsize: self.blksize + LAN_HEADER_LEN + RECV_HEADROOM,
        };
        self.recv_task = Some(tokio::spawn(rx.run()));

        let tx = SendLoop {
            socket,
            circuit: self.circuit,
            kind: self.kind,
            station: self.station,
            peers: self.peers.clone(),
            event_tx: self.event_tx.clone(),
        };
        self.send_task = Some(tokio::spawn(tx.run(frames)));

        self.state = DatalinkState::Up;
        info!(
            circuit = %self.name,
            kind = %self.kind,
            local_addr = %local_addr,
            "UDP datalink started"
        );

        if self.event_tx.try_send(DatalinkEvent::Up(self.circuit)).is_err() {
            warn!(circuit = %self.name, "Event channel full, circuit up not delivered");
        }
        Ok(())
    }

    /// Stop both loops and report the circuit down.
    pub async fn stop_async(&mut self) -> Result<(), DatalinkError> {
        if !self.state.is_operational() {
            return Err(DatalinkError::NotStarted);
        }

        for task in [self.recv_task.take(), self.send_task.take()].into_iter().flatten() {
            task.abort();
            let _ = task.await;
        }
        self.local_addr = None;
        self.state = DatalinkState::Down;

        let _ = self.event_tx.try_send(DatalinkEvent::Down(self.circuit));
        debug!(circuit = %self.name, "UDP datalink stopped");
        Ok(())
    }
}

struct ReceiveLoop {
    socket: Arc<UdpSocket>,
    circuit: CircuitId,
    kind: CircuitKind,
    station: MacAddr,
    groups: Vec<MacAddr>,
    peers: Peers,
    event_tx: EventTx,
    bufsize: usize,
}

impl ReceiveLoop {
    async fn run(self) {
        let mut buf = vec![0u8; self.bufsize];
        debug!(circuit = %self.circuit, "UDP receive loop starting");

        loop {
            let (len, remote_addr) = match self.socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    // Transient errors are expected (e.g. ICMP port unreachable)
                    warn!(circuit = %self.circuit, error = %e, "UDP receive error");
                    continue;
                }
            };
            self.learn_peer(remote_addr).await;

            let frame = match self.kind {
                CircuitKind::Ptp => ReceivedFrame::new(self.circuit, None, buf[..len].to_vec()),
                CircuitKind::Lan => {
                    let Some((dst, src, payload)) = decode_lan_frame(&buf[..len]) else {
                        trace!(circuit = %self.circuit, bytes = len, "Runt LAN frame dropped");
                        continue;
                    };
                    if src == self.station || !self.accepts(dst) {
                        continue;
                    }
                    ReceivedFrame::new(self.circuit, Some(src), payload.to_vec())
                }
            };

            trace!(
                circuit = %self.circuit,
                remote_addr = %remote_addr,
                bytes = len,
                "UDP frame received"
            );

            if self.event_tx.send(DatalinkEvent::Frame(frame)).await.is_err() {
                info!(circuit = %self.circuit, "Event channel closed, stopping receive loop");
                break;
            }
        }

        debug!(circuit = %self.circuit, "UDP receive loop stopped");
    }

    fn accepts(&self, dst: MacAddr) -> bool {
        dst == self.station || self.groups.contains(&dst)
    }

    async fn learn_peer(&self, addr: SocketAddr) {
        let known = self.peers.read().await.contains(&addr);
        if known {
            return;
        }
        let mut peers = self.peers.write().await;
        match self.kind {
            CircuitKind::Ptp if peers.is_empty() => peers.push(addr),
            CircuitKind::Lan => peers.push(addr),
            CircuitKind::Ptp => return,
        }
        debug!(circuit = %self.circuit, peer = %addr, "UDP peer learned");
    }
}

struct SendLoop {
    socket: Arc<UdpSocket>,
    circuit: CircuitId,
    kind: CircuitKind,
    station: MacAddr,
    peers: Peers,
    event_tx: EventTx,
}

impl SendLoop {
    async fn run(self, mut frames: FrameRx) {
        while let Some(frame) = frames.recv().await {
            let data = self.wire(frame);
            let peers = self.peers.read().await.clone();
            for peer in peers {
                if let Err(e) = self.socket.send_to(&data, peer).await {
                    debug!(circuit = %self.circuit, peer = %peer, error = %e, "UDP send failed");
                    let _ = self.event_tx.try_send(DatalinkEvent::SendFailed {
                        circuit: self.circuit,
                        error: e.to_string(),
                    });
                }
            }
        }
        debug!(circuit = %self.circuit, "UDP send loop stopped (queue closed)");
    }

    fn wire(&self, frame: OutboundFrame) -> Vec<u8> {
        match self.kind {
            CircuitKind::Ptp => frame.data,
            CircuitKind::Lan => {
                let dst = frame.dst.unwrap_or(MacAddr::ALL_ROUTERS);
                encode_lan_frame(dst, self.station, &frame.data)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
