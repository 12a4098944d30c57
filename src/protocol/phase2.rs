//! Phase II messages: node init, node verify, NOP and the intercept
//! route header, plus the bits of the NSP header intercept needs to look at.

use std::fmt;

use super::codec::{bits, set_bits, Field, FieldType, Reader, Writer};
use super::ProtocolError;
use crate::identity::Version;

/// Message flag of node init and node verify.
pub const NODE_INIT_FLAG: u8 = 0x58;

/// Message flag of NOP messages.
pub const NOP_FLAG: u8 = 0x08;

/// Message flag of the Phase II route header.
pub const ROUTE_HEADER_FLAG: u8 = 0x46;

/// NSP version carried in node init (3.1.0).
pub const NSP_VERSION_PH2: Version = Version::new(3, 1, 0);

/// Intercept function value when offering intercept.
pub const INT_OFFER: u8 = 7;

/// Intercept request value when requesting intercept.
pub const RINT_REQUEST: u8 = 3;

/// Disconnect reason: destination unreachable.
pub const REASON_UNREACHABLE: u16 = 39;

// ============================================================================
// Node Init
// ============================================================================

/// Phase II node initialization message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInit {
    pub srcnode: u16,
    pub nodename: String,
    /// Intercept functions offered.
    pub int: u8,
    /// Sender requests a node verify.
    pub verif: bool,
    /// Intercept requested.
    pub rint: u8,
    pub blksize: u16,
    pub nspsize: u16,
    pub maxlnks: u16,
    pub routver: Version,
    pub commver: Version,
    pub sysver: String,
}

impl NodeInit {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("msgflag", FieldType::U8),
        Field::new("starttype", FieldType::U8),
        Field::new("srcnode", FieldType::Extensible(2)),
        Field::new("nodename", FieldType::Image(6)),
        Field::new("functions", FieldType::Flags),
        Field::new("requests", FieldType::Flags),
        Field::new("blksize", FieldType::U16),
        Field::new("nspsize", FieldType::U16),
        Field::new("maxlnks", FieldType::U16),
        Field::new("routver", FieldType::Version),
        Field::new("commver", FieldType::Version),
        Field::new("sysver", FieldType::Image(32)),
    ];

    pub fn new(srcnode: u16, nodename: &str, blksize: u16) -> Self {
        Self {
            srcnode,
            nodename: nodename.to_string(),
            int: 0,
            verif: false,
            rint: 0,
            blksize,
            nspsize: blksize,
            maxlnks: 4095,
            routver: Version::PHASE2,
            commver: NSP_VERSION_PH2,
            sysver: String::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(24 + self.nodename.len() + self.sysver.len());
        w.u8(NODE_INIT_FLAG)
            .u8(1)
            .extensible(self.srcnode as u32)
            .image(self.nodename.as_bytes(), 6)
            .u8(set_bits(self.int, 0, 3))
            .u8(set_bits(self.verif as u8, 0, 1) | set_bits(self.rint, 1, 2))
            .u16(self.blksize)
            .u16(self.nspsize)
            .u16(self.maxlnks)
            .version(self.routver)
            .version(self.commver)
            .image(self.sysver.as_bytes(), 32);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        let flag = r.u8()?;
        if flag != NODE_INIT_FLAG {
            return Err(ProtocolError::InvalidMessageType(flag));
        }
        let starttype = r.u8()?;
        if starttype != 1 {
            return Err(ProtocolError::InvalidField {
                field: "starttype",
                value: starttype as u32,
            });
        }
        let srcnode = r.extensible("srcnode", 2)?;
        let nodename = ascii(r.image("nodename", 6)?);
        let int = bits(r.u8()?, 0, 3);
        let requests = r.u8()?;
        let blksize = r.u16()?;
        let nspsize = r.u16()?;
        let maxlnks = r.u16()?;
        let routver = r.version()?;
        let commver = r.version()?;
        let sysver = ascii(r.image("sysver", 32)?);
        r.finish()?;
        Ok(Self {
            srcnode: srcnode as u16,
            nodename,
            int,
            verif: bits(requests, 0, 1) != 0,
            rint: bits(requests, 1, 2),
            blksize,
            nspsize,
            maxlnks,
            routver,
            commver,
            sysver,
        })
    }
}

fn ascii(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

// ============================================================================
// Node Verify
// ============================================================================

/// Phase II node verification message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeVerify {
    pub password: [u8; 8],
}

impl NodeVerify {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("msgflag", FieldType::U8),
        Field::new("starttype", FieldType::U16),
        Field::new("password", FieldType::Bytes(8)),
    ];

    /// Build from a password of at most 8 bytes, zero padded.
    pub fn new(password: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        let len = password.len().min(8);
        buf[..len].copy_from_slice(&password[..len]);
        Self { password: buf }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(11);
        w.u8(NODE_INIT_FLAG).u16(2).bytes(&self.password);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        let flag = r.u8()?;
        if flag != NODE_INIT_FLAG {
            return Err(ProtocolError::InvalidMessageType(flag));
        }
        let starttype = r.u16()?;
        if starttype != 2 {
            return Err(ProtocolError::InvalidField {
                field: "starttype",
                value: starttype as u32,
            });
        }
        let password = r.array()?;
        r.finish()?;
        Ok(Self { password })
    }

    /// True if the received password equals `expected` (zero padded).
    pub fn matches(&self, expected: &[u8]) -> bool {
        self.password == NodeVerify::new(expected).password
    }
}

// ============================================================================
// NOP
// ============================================================================

/// Phase II keepalive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NopMsg {
    pub payload: Vec<u8>,
}

impl NopMsg {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("msgflag", FieldType::U8),
        Field::new("payload", FieldType::Payload),
    ];

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(1 + self.payload.len());
        w.u8(NOP_FLAG).bytes(&self.payload);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        let flag = r.u8()?;
        if flag != NOP_FLAG {
            return Err(ProtocolError::InvalidMessageType(flag));
        }
        Ok(Self {
            payload: r.rest().to_vec(),
        })
    }
}

// ============================================================================
// Route Header
// ============================================================================

/// Phase II route header. Node names, not addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteHeader {
    pub dstnode: String,
    pub srcnode: String,
    pub payload: Vec<u8>,
}

impl RouteHeader {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("msgflag", FieldType::U8),
        Field::new("dstnode", FieldType::Image(6)),
        Field::new("srcnode", FieldType::Image(6)),
        Field::new("payload", FieldType::Payload),
    ];

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(14 + self.payload.len());
        w.u8(ROUTE_HEADER_FLAG)
            .image(self.dstnode.as_bytes(), 6)
            .image(self.srcnode.as_bytes(), 6)
            .bytes(&self.payload);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        let flag = r.u8()?;
        if flag != ROUTE_HEADER_FLAG {
            return Err(ProtocolError::InvalidMessageType(flag));
        }
        let dstnode = ascii(r.image("dstnode", 6)?).to_ascii_uppercase();
        let srcnode = ascii(r.image("srcnode", 6)?).to_ascii_uppercase();
        Ok(Self {
            dstnode,
            srcnode,
            payload: r.rest().to_vec(),
        })
    }
}

// ============================================================================
// NSP Header
// ============================================================================

/// NSP message classes relevant to intercept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NspKind {
    /// Data segment, interrupt, link service or data/other ack: carries
    /// both link addresses and can be routed from a relay entry.
    Ack,
    ConnectAck,
    ConnectInit,
    ConnectConfirm,
    DisconnectInit,
    DisconnectConfirm,
    Nop,
}

impl NspKind {
    pub fn from_byte(msgflag: u8) -> Option<Self> {
        match msgflag {
            0x00 | 0x20 | 0x40 | 0x60 | 0x30 | 0x10 | 0x04 | 0x14 => Some(NspKind::Ack),
            0x24 => Some(NspKind::ConnectAck),
            0x18 | 0x68 => Some(NspKind::ConnectInit),
            0x28 => Some(NspKind::ConnectConfirm),
            0x38 => Some(NspKind::DisconnectInit),
            0x48 => Some(NspKind::DisconnectConfirm),
            0x08 => Some(NspKind::Nop),
            _ => None,
        }
    }
}

impl fmt::Display for NspKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NspKind::Ack => "Ack",
            NspKind::ConnectAck => "ConnectAck",
            NspKind::ConnectInit => "ConnectInit",
            NspKind::ConnectConfirm => "ConnectConfirm",
            NspKind::DisconnectInit => "DisconnectInit",
            NspKind::DisconnectConfirm => "DisconnectConfirm",
            NspKind::Nop => "Nop",
        };
        write!(f, "{}", name)
    }
}

/// Message flag and link addresses at the start of an NSP message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NspHeader {
    pub kind: NspKind,
    pub dstaddr: u16,
    pub srcaddr: u16,
}

impl NspHeader {
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        let flag = r.u8()?;
        let kind = NspKind::from_byte(flag).ok_or(ProtocolError::InvalidMessageType(flag))?;
        let (dstaddr, srcaddr) = match kind {
            NspKind::Nop => (0, 0),
            NspKind::ConnectAck => (r.u16()?, 0),
            _ => (r.u16()?, r.u16()?),
        };
        Ok(Self {
            kind,
            dstaddr,
            srcaddr,
        })
    }
}

/// A disconnect confirm answering `hdr` with `reason`. Link addresses are
/// swapped.
pub fn disconnect_confirm(hdr: &NspHeader, reason: u16) -> Vec<u8> {
    let mut w = Writer::with_capacity(7);
    w.u8(0x48).u16(hdr.srcaddr).u16(hdr.dstaddr).u16(reason);
    w.finish()
}

