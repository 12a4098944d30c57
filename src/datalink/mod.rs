//! Datalink Abstractions
//!
//! Channel types connecting datalinks to the node's dispatcher. A datalink
//! delivers received frames and up/down notifications as
//! [`DatalinkEvent`]s and drains a bounded per-circuit queue of
//! [`OutboundFrame`]s. The dispatcher only ever `try_send`s into that
//! queue; a full queue drops the frame and counts it.
//!
//! LAN circuits carry 48-bit station addresses; over UDP each frame is
//! prefixed with the destination and source station.

pub mod udp;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::circuit::CircuitId;
use crate::identity::MacAddr;

/// Destination plus source station address.
pub const LAN_HEADER_LEN: usize = 12;

// ============================================================================
// Events
// ============================================================================

/// A frame received on a circuit.
#[derive(Clone, Debug)]
pub struct ReceivedFrame {
    pub circuit: CircuitId,
    /// Sending station, on LAN circuits.
    pub src: Option<MacAddr>,
    pub data: Vec<u8>,
    /// Receipt timestamp (Unix milliseconds).
    pub timestamp_ms: u64,
}

impl ReceivedFrame {
    /// Create a new received frame with current timestamp.
    pub fn new(circuit: CircuitId, src: Option<MacAddr>, data: Vec<u8>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            circuit,
            src,
            data,
            timestamp_ms,
        }
    }
}

/// Everything a datalink reports to the dispatcher.
#[derive(Clone, Debug)]
pub enum DatalinkEvent {
    Frame(ReceivedFrame),
    Up(CircuitId),
    Down(CircuitId),
    /// An earlier send failed asynchronously.
    SendFailed { circuit: CircuitId, error: String },
}

impl DatalinkEvent {
    pub fn circuit(&self) -> CircuitId {
        match self {
            DatalinkEvent::Frame(f) => f.circuit,
            DatalinkEvent::Up(c) | DatalinkEvent::Down(c) => *c,
            DatalinkEvent::SendFailed { circuit, .. } => *circuit,
        }
    }
}

/// Channel sender for datalink events.
pub type EventTx = mpsc::Sender<DatalinkEvent>;

/// Channel receiver for datalink events.
pub type EventRx = mpsc::Receiver<DatalinkEvent>;

/// Create an event channel with the given buffer size.
pub fn event_channel(buffer: usize) -> (EventTx, EventRx) {
    mpsc::channel(buffer)
}

// ============================================================================
// Send Path
// ============================================================================

/// A frame queued for transmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Destination station on LAN circuits; `None` on point-to-point.
    pub dst: Option<MacAddr>,
    pub data: Vec<u8>,
}

pub type FrameTx = mpsc::Sender<OutboundFrame>;
pub type FrameRx = mpsc::Receiver<OutboundFrame>;

/// Create a circuit send queue.
pub fn frame_channel(buffer: usize) -> (FrameTx, FrameRx) {
    mpsc::channel(buffer)
}

/// Result of queueing a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queue full, frame dropped.
    Dropped,
    /// No datalink attached.
    Closed,
}

/// The dispatcher's end of one circuit's send queue.
#[derive(Debug)]
pub struct SendQueue {
    tx: Option<FrameTx>,
    sent: u64,
    dropped: u64,
}

impl SendQueue {
    pub fn new(tx: FrameTx) -> Self {
        Self {
            tx: Some(tx),
            sent: 0,
            dropped: 0,
        }
    }

    /// A queue with nothing behind it; every frame is discarded.
    pub fn detached() -> Self {
        Self {
            tx: None,
            sent: 0,
            dropped: 0,
        }
    }

    /// Queue without waiting.
    pub fn push(&mut self, frame: OutboundFrame) -> SendOutcome {
        let Some(tx) = &self.tx else {
            return SendOutcome::Closed;
        };
        match tx.try_send(frame) {
            Ok(()) => {
                self.sent += 1;
                SendOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                SendOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.tx = None;
                SendOutcome::Closed
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

// ============================================================================
// LAN Framing
// ============================================================================

/// Prefix `data` with destination and source station.
pub fn encode_lan_frame(dst: MacAddr, src: MacAddr, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LAN_HEADER_LEN + data.len());
    buf.extend_from_slice(dst.as_bytes());
    buf.extend_from_slice(src.as_bytes());
    buf.extend_from_slice(data);
    buf
}

/// Split a LAN frame into (destination, source, payload).
pub fn decode_lan_frame(buf: &[u8]) -> Option<(MacAddr, MacAddr, &[u8])> {
    if buf.len() < LAN_HEADER_LEN {
        return None;
    }
    let dst: [u8; 6] = buf[0..6].try_into().ok()?;
    let src: [u8; 6] = buf[6..12].try_into().ok()?;
    Some((
        MacAddr::from_bytes(dst),
        MacAddr::from_bytes(src),
        &buf[LAN_HEADER_LEN..],
    ))
}

// ============================================================================
// State and Errors
// ============================================================================

/// Datalink lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatalinkState {
    /// Configured but not started.
    Configured,
    /// Ready for frames.
    Up,
    /// Was up, now stopped.
    Down,
    /// Failed to start.
    Failed,
}

impl DatalinkState {
    pub fn is_operational(&self) -> bool {
        matches!(self, DatalinkState::Up)
    }

    pub fn can_start(&self) -> bool {
        matches!(
            self,
            DatalinkState::Configured | DatalinkState::Down | DatalinkState::Failed
        )
    }
}

impl fmt::Display for DatalinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatalinkState::Configured => "configured",
            DatalinkState::Up => "up",
            DatalinkState::Down => "down",
            DatalinkState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Errors related to datalink operations.
#[derive(Debug, Error)]
pub enum DatalinkError {
    #[error("datalink not started")]
    NotStarted,

    #[error("datalink already started")]
    AlreadyStarted,

    #[error("datalink failed to start: {0}")]
    StartFailed(String),

    #[error("invalid datalink address: {0}")]
    InvalidAddress(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
