//! DECnet Routing Layer Messages
//!
//! Wire formats for the three routing generations that interoperate on a
//! node:
//!
//! ## Point-to-point control (Phase III and IV)
//!
//! Init, Verify and Hello messages drive the circuit handshake; level 1,
//! level 2 and Phase III routing messages carry distance vectors.
//!
//! ## LAN control (Phase IV)
//!
//! Router and endnode hellos establish adjacencies and elect the
//! designated router; routing messages are shared with point-to-point.
//!
//! ## Data
//!
//! Short (point-to-point) and long (LAN) routed data headers.
//!
//! ## Phase II
//!
//! Node init, node verify, NOP and the name based route header used by
//! intercept.
//!
//! Every kind is a closed tag in [`PacketKind`]; matching a buffer to a
//! kind is an equality test on that tag, decided by the `classify_*`
//! functions from the header bytes and the circuit context.

pub mod codec;
mod control;
mod data;
mod error;
mod hello;
mod phase2;
mod routing;
#[cfg(test)]
mod tests;

use std::fmt;

use crate::identity::Phase;
use codec::Field;

pub use control::{is_test_data, ControlType, PtpHello, PtpInit, PtpInit3, PtpVerify, TEST_DATA_BYTE};
pub use data::{DataHeader, LongData, ShortData, MAX_SHORT_VISIT};
pub use error::ProtocolError;
pub use hello::{EndnodeHello, RouterHello, RsEntry};
pub use phase2::{
    disconnect_confirm, NodeInit, NodeVerify, NopMsg, NspHeader, NspKind, RouteHeader,
    INT_OFFER, NODE_INIT_FLAG, NOP_FLAG, REASON_UNREACHABLE, RINT_REQUEST, ROUTE_HEADER_FLAG,
};
pub use routing::{
    checksum, split_vector, L1Routing, L2Routing, Phase3Routing, RouteEntry, Segment,
    INFINITE_COST, INFINITE_HOPS,
};

// ============================================================================
// Packet Kinds
// ============================================================================

/// Closed set of routing layer packet kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketKind {
    PtpInit,
    PtpInit3,
    PtpVerify,
    PtpHello,
    L1Routing,
    L2Routing,
    Phase3Routing,
    RouterHello,
    EndnodeHello,
    ShortData,
    LongData,
    NodeInit,
    NodeVerify,
    Nop,
    RouteHeader,
}

impl PacketKind {
    /// Declared field layout.
    pub fn layout(self) -> &'static [Field] {
        match self {
            PacketKind::PtpInit => PtpInit::LAYOUT,
            PacketKind::PtpInit3 => PtpInit3::LAYOUT,
            PacketKind::PtpVerify => PtpVerify::LAYOUT,
            PacketKind::PtpHello => PtpHello::LAYOUT,
            PacketKind::L1Routing => L1Routing::LAYOUT,
            PacketKind::L2Routing => L2Routing::LAYOUT,
            PacketKind::Phase3Routing => Phase3Routing::LAYOUT,
            PacketKind::RouterHello => RouterHello::LAYOUT,
            PacketKind::EndnodeHello => EndnodeHello::LAYOUT,
            PacketKind::ShortData => ShortData::LAYOUT,
            PacketKind::LongData => LongData::LAYOUT,
            PacketKind::NodeInit => NodeInit::LAYOUT,
            PacketKind::NodeVerify => NodeVerify::LAYOUT,
            PacketKind::Nop => NopMsg::LAYOUT,
            PacketKind::RouteHeader => RouteHeader::LAYOUT,
        }
    }

    /// Smallest valid encoding of this kind.
    pub fn min_len(self) -> usize {
        codec::min_len(self.layout())
    }

    /// True for routed data.
    pub fn is_data(self) -> bool {
        matches!(self, PacketKind::ShortData | PacketKind::LongData)
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::PtpInit => "PtpInit",
            PacketKind::PtpInit3 => "PtpInit3",
            PacketKind::PtpVerify => "PtpVerify",
            PacketKind::PtpHello => "PtpHello",
            PacketKind::L1Routing => "L1Routing",
            PacketKind::L2Routing => "L2Routing",
            PacketKind::Phase3Routing => "Phase3Routing",
            PacketKind::RouterHello => "RouterHello",
            PacketKind::EndnodeHello => "EndnodeHello",
            PacketKind::ShortData => "ShortData",
            PacketKind::LongData => "LongData",
            PacketKind::NodeInit => "NodeInit",
            PacketKind::NodeVerify => "NodeVerify",
            PacketKind::Nop => "Nop",
            PacketKind::RouteHeader => "RouteHeader",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Decoded Packets
// ============================================================================

/// A decoded packet of any kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    PtpInit(PtpInit),
    PtpInit3(PtpInit3),
    PtpVerify(PtpVerify),
    PtpHello(PtpHello),
    L1Routing(L1Routing),
    L2Routing(L2Routing),
    Phase3Routing(Phase3Routing),
    RouterHello(RouterHello),
    EndnodeHello(EndnodeHello),
    ShortData(ShortData),
    LongData(LongData),
    NodeInit(NodeInit),
    NodeVerify(NodeVerify),
    Nop(NopMsg),
    RouteHeader(RouteHeader),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::PtpInit(_) => PacketKind::PtpInit,
            Packet::PtpInit3(_) => PacketKind::PtpInit3,
            Packet::PtpVerify(_) => PacketKind::PtpVerify,
            Packet::PtpHello(_) => PacketKind::PtpHello,
            Packet::L1Routing(_) => PacketKind::L1Routing,
            Packet::L2Routing(_) => PacketKind::L2Routing,
            Packet::Phase3Routing(_) => PacketKind::Phase3Routing,
            Packet::RouterHello(_) => PacketKind::RouterHello,
            Packet::EndnodeHello(_) => PacketKind::EndnodeHello,
            Packet::ShortData(_) => PacketKind::ShortData,
            Packet::LongData(_) => PacketKind::LongData,
            Packet::NodeInit(_) => PacketKind::NodeInit,
            Packet::NodeVerify(_) => PacketKind::NodeVerify,
            Packet::Nop(_) => PacketKind::Nop,
            Packet::RouteHeader(_) => PacketKind::RouteHeader,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::PtpInit(p) => p.encode(),
            Packet::PtpInit3(p) => p.encode(),
            Packet::PtpVerify(p) => p.encode(),
            Packet::PtpHello(p) => p.encode(),
            Packet::L1Routing(p) => p.encode(),
            Packet::L2Routing(p) => p.encode(),
            Packet::Phase3Routing(p) => p.encode(),
            Packet::RouterHello(p) => p.encode(),
            Packet::EndnodeHello(p) => p.encode(),
            Packet::ShortData(p) => p.encode(),
            Packet::LongData(p) => p.encode(),
            Packet::NodeInit(p) => p.encode(),
            Packet::NodeVerify(p) => p.encode(),
            Packet::Nop(p) => p.encode(),
            Packet::RouteHeader(p) => p.encode(),
        }
    }
}

/// Decode `bytes` as a packet of kind `expected`.
///
/// The buffer must be at least the layout's minimum length and carry the
/// kind's header tag; anything short or inconsistent is an error.
pub fn decode(bytes: &[u8], expected: PacketKind) -> Result<Packet, ProtocolError> {
    let min = expected.min_len();
    if bytes.len() < min {
        return Err(ProtocolError::MessageTooShort {
            expected: min,
            got: bytes.len(),
        });
    }
    Ok(match expected {
        PacketKind::PtpInit => Packet::PtpInit(PtpInit::decode(bytes)?),
        PacketKind::PtpInit3 => Packet::PtpInit3(PtpInit3::decode(bytes)?),
        PacketKind::PtpVerify => Packet::PtpVerify(PtpVerify::decode(bytes)?),
        PacketKind::PtpHello => Packet::PtpHello(PtpHello::decode(bytes)?),
        PacketKind::L1Routing => Packet::L1Routing(L1Routing::decode(bytes)?),
        PacketKind::L2Routing => Packet::L2Routing(L2Routing::decode(bytes)?),
        PacketKind::Phase3Routing => Packet::Phase3Routing(Phase3Routing::decode(bytes)?),
        PacketKind::RouterHello => Packet::RouterHello(RouterHello::decode(bytes)?),
        PacketKind::EndnodeHello => Packet::EndnodeHello(EndnodeHello::decode(bytes)?),
        PacketKind::ShortData => Packet::ShortData(ShortData::decode(bytes)?),
        PacketKind::LongData => Packet::LongData(LongData::decode(bytes)?),
        PacketKind::NodeInit => Packet::NodeInit(NodeInit::decode(bytes)?),
        PacketKind::NodeVerify => Packet::NodeVerify(NodeVerify::decode(bytes)?),
        PacketKind::Nop => Packet::Nop(NopMsg::decode(bytes)?),
        PacketKind::RouteHeader => Packet::RouteHeader(RouteHeader::decode(bytes)?),
    })
}

// ============================================================================
// Classification
// ============================================================================

/// Remove leading padding.
///
/// A first byte with bit 7 set is a pad byte whose low bits give the pad
/// length including itself. Only Phase IV circuits may pad.
pub fn strip_padding(buf: &[u8], allowed: bool) -> Result<&[u8], ProtocolError> {
    match buf.first() {
        Some(&b) if b & 0x80 != 0 => {
            let len = (b & 0x7f) as usize;
            if !allowed || len == 0 || len > buf.len() {
                return Err(ProtocolError::InvalidPadding(b));
            }
            Ok(&buf[len..])
        }
        _ => Ok(buf),
    }
}

fn first_byte(buf: &[u8]) -> Result<u8, ProtocolError> {
    buf.first()
        .copied()
        .ok_or(ProtocolError::MessageTooShort { expected: 1, got: 0 })
}

fn classify_node_init(buf: &[u8]) -> Result<PacketKind, ProtocolError> {
    match buf.get(1) {
        Some(1) => Ok(PacketKind::NodeInit),
        Some(2) => Ok(PacketKind::NodeVerify),
        Some(&other) => Err(ProtocolError::InvalidField {
            field: "starttype",
            value: other as u32,
        }),
        None => Err(ProtocolError::MessageTooShort {
            expected: 2,
            got: buf.len(),
        }),
    }
}

/// Classify a frame received on a point-to-point circuit whose neighbor
/// speaks `phase` (Phase IV while the neighbor is still unknown).
pub fn classify_ptp(buf: &[u8], phase: Phase) -> Result<PacketKind, ProtocolError> {
    let b = first_byte(buf)?;
    if b == NODE_INIT_FLAG {
        return classify_node_init(buf);
    }
    if let Some(ct) = ControlType::from_byte(b) {
        let kind = match ct {
            ControlType::Init => {
                let major = buf
                    .get(control::INIT_TIVER_OFFSET)
                    .copied()
                    .ok_or(ProtocolError::MessageTooShort {
                        expected: PacketKind::PtpInit3.min_len(),
                        got: buf.len(),
                    })?;
                if major >= 2 {
                    PacketKind::PtpInit
                } else {
                    PacketKind::PtpInit3
                }
            }
            ControlType::Verify => PacketKind::PtpVerify,
            ControlType::Hello => PacketKind::PtpHello,
            ControlType::L1Routing if phase == Phase::Phase3 => PacketKind::Phase3Routing,
            ControlType::L1Routing => PacketKind::L1Routing,
            ControlType::L2Routing if phase == Phase::Phase3 => {
                return Err(ProtocolError::UnexpectedKind {
                    kind: PacketKind::L2Routing,
                    circuit: "Phase III",
                });
            }
            ControlType::L2Routing => PacketKind::L2Routing,
            ControlType::RouterHello => {
                return Err(ProtocolError::UnexpectedKind {
                    kind: PacketKind::RouterHello,
                    circuit: "point-to-point",
                });
            }
            ControlType::EndnodeHello => {
                return Err(ProtocolError::UnexpectedKind {
                    kind: PacketKind::EndnodeHello,
                    circuit: "point-to-point",
                });
            }
        };
        return Ok(kind);
    }
    if ShortData::matches(b) {
        return Ok(PacketKind::ShortData);
    }
    if LongData::matches(b) {
        return Ok(PacketKind::LongData);
    }
    Err(ProtocolError::InvalidMessageType(b))
}

/// Classify a frame received on a LAN circuit.
pub fn classify_lan(buf: &[u8]) -> Result<PacketKind, ProtocolError> {
    let b = first_byte(buf)?;
    match ControlType::from_byte(b) {
        Some(ControlType::RouterHello) => Ok(PacketKind::RouterHello),
        Some(ControlType::EndnodeHello) => Ok(PacketKind::EndnodeHello),
        Some(ControlType::L1Routing) => Ok(PacketKind::L1Routing),
        Some(ControlType::L2Routing) => Ok(PacketKind::L2Routing),
        Some(ct) => {
            let kind = match ct {
                ControlType::Init => PacketKind::PtpInit,
                ControlType::Verify => PacketKind::PtpVerify,
                _ => PacketKind::PtpHello,
            };
            Err(ProtocolError::UnexpectedKind {
                kind,
                circuit: "LAN",
            })
        }
        None if LongData::matches(b) => Ok(PacketKind::LongData),
        None if ShortData::matches(b) => Ok(PacketKind::ShortData),
        None => Err(ProtocolError::InvalidMessageType(b)),
    }
}

/// Classify a frame from a Phase II neighbor. `None` means a bare NSP
/// message with no routing layer header.
pub fn classify_phase2(buf: &[u8]) -> Result<Option<PacketKind>, ProtocolError> {
    let b = first_byte(buf)?;
    match b {
        NODE_INIT_FLAG => classify_node_init(buf).map(Some),
        NOP_FLAG => Ok(Some(PacketKind::Nop)),
        ROUTE_HEADER_FLAG => Ok(Some(PacketKind::RouteHeader)),
        _ => Ok(None),
    }
}
