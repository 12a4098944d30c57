//! Protocol error types.

use super::PacketKind;
use thiserror::Error;

/// A frame that could not be decoded.
///
/// Every variant means the same thing to the caller: the packet is
/// malformed, it is dropped and counted, and no state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("message too short: expected at least {expected}, got {got}")]
    MessageTooShort { expected: usize, got: usize },

    #[error("field {field} too long: max {max}, got {got}")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        got: usize,
    },

    #[error("invalid message type: 0x{0:02x}")]
    InvalidMessageType(u8),

    #[error("{kind} not valid on {circuit} circuits")]
    UnexpectedKind {
        kind: PacketKind,
        circuit: &'static str,
    },

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: u32 },

    #[error("invalid routing segment: start {start}, count {count}")]
    InvalidSegment { start: u16, count: u16 },

    #[error("routing checksum mismatch: computed 0x{computed:04x}, received 0x{received:04x}")]
    ChecksumMismatch { computed: u16, received: u16 },

    #[error("invalid padding length {0}")]
    InvalidPadding(u8),

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("malformed message: {0}")]
    Malformed(String),
}
