//! Routed data packet headers.

use super::codec::{bits, set_bits, Field, FieldType, Reader, Writer};
use super::ProtocolError;
use crate::identity::{NodeId, HIORD};

/// Short format code (bits 0-2 of the flags byte).
const SHORT_FORMAT: u8 = 2;

/// Long format code.
const LONG_FORMAT: u8 = 6;

/// Largest visit count the short header can carry.
pub const MAX_SHORT_VISIT: u8 = 0x3f;

/// Routing fields common to both data header formats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataHeader {
    pub dstnode: NodeId,
    pub srcnode: NodeId,
    /// Return to sender if the destination is unreachable.
    pub rqr: bool,
    /// Packet is on its way back to the sender.
    pub rts: bool,
    pub visit: u8,
}

impl DataHeader {
    pub fn new(srcnode: NodeId, dstnode: NodeId, rqr: bool) -> Self {
        Self {
            dstnode,
            srcnode,
            rqr,
            rts: false,
            visit: 0,
        }
    }

    fn flags(&self, format: u8) -> u8 {
        set_bits(format, 0, 3) | set_bits(self.rqr as u8, 3, 1) | set_bits(self.rts as u8, 4, 1)
    }
}

// ============================================================================
// Short Data
// ============================================================================

/// Data packet with the point-to-point (short) routing header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortData {
    pub header: DataHeader,
    pub payload: Vec<u8>,
}

impl ShortData {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("flags", FieldType::Flags),
        Field::new("dstnode", FieldType::Node),
        Field::new("srcnode", FieldType::Node),
        Field::new("forward", FieldType::Flags),
        Field::new("payload", FieldType::Payload),
    ];

    /// Header length in bytes.
    pub const HEADER_LEN: usize = 6;

    pub fn new(header: DataHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// True if `flags` is a short data header.
    pub fn matches(flags: u8) -> bool {
        flags & 0x81 == 0 && bits(flags, 0, 3) == SHORT_FORMAT
    }

    pub fn encode(&self) -> Vec<u8> {
        let h = &self.header;
        let mut w = Writer::with_capacity(Self::HEADER_LEN + self.payload.len());
        w.u8(h.flags(SHORT_FORMAT))
            .node(h.dstnode)
            .node(h.srcnode)
            .u8(set_bits(h.visit.min(MAX_SHORT_VISIT), 0, 6))
            .bytes(&self.payload);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        let flags = r.u8()?;
        if !Self::matches(flags) {
            return Err(ProtocolError::InvalidMessageType(flags));
        }
        let dstnode = r.node()?;
        let srcnode = r.node()?;
        let visit = bits(r.u8()?, 0, 6);
        Ok(Self {
            header: DataHeader {
                dstnode,
                srcnode,
                rqr: bits(flags, 3, 1) != 0,
                rts: bits(flags, 4, 1) != 0,
                visit,
            },
            payload: r.rest().to_vec(),
        })
    }
}

// ============================================================================
// Long Data
// ============================================================================

/// Data packet with the LAN (long) routing header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LongData {
    pub header: DataHeader,
    /// Destination is on the LAN the packet arrived from.
    pub ie: bool,
    pub payload: Vec<u8>,
}

impl LongData {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("flags", FieldType::Flags),
        Field::new("d_area", FieldType::U8),
        Field::new("d_subarea", FieldType::U8),
        Field::new("d_hiid", FieldType::Bytes(4)),
        Field::new("dstnode", FieldType::Node),
        Field::new("s_area", FieldType::U8),
        Field::new("s_subarea", FieldType::U8),
        Field::new("s_hiid", FieldType::Bytes(4)),
        Field::new("srcnode", FieldType::Node),
        Field::new("nl2", FieldType::U8),
        Field::new("visit", FieldType::U8),
        Field::new("s_class", FieldType::U8),
        Field::new("pt", FieldType::U8),
        Field::new("payload", FieldType::Payload),
    ];

    /// Header length in bytes.
    pub const HEADER_LEN: usize = 21;

    pub fn new(header: DataHeader, ie: bool, payload: Vec<u8>) -> Self {
        Self {
            header,
            ie,
            payload,
        }
    }

    /// True if `flags` is a long data header.
    pub fn matches(flags: u8) -> bool {
        flags & 0x81 == 0 && bits(flags, 0, 3) == LONG_FORMAT
    }

    pub fn encode(&self) -> Vec<u8> {
        let h = &self.header;
        let mut w = Writer::with_capacity(Self::HEADER_LEN + self.payload.len());
        w.u8(h.flags(LONG_FORMAT) | set_bits(self.ie as u8, 5, 1))
            .zeros(2)
            .bytes(&HIORD)
            .node(h.dstnode)
            .zeros(2)
            .bytes(&HIORD)
            .node(h.srcnode)
            .u8(0)
            .u8(h.visit)
            .zeros(2)
            .bytes(&self.payload);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        let flags = r.u8()?;
        if !Self::matches(flags) {
            return Err(ProtocolError::InvalidMessageType(flags));
        }
        r.skip(2)?;
        r.skip(4)?;
        let dstnode = r.node()?;
        r.skip(2)?;
        r.skip(4)?;
        let srcnode = r.node()?;
        r.skip(1)?;
        let visit = r.u8()?;
        r.skip(2)?;
        Ok(Self {
            header: DataHeader {
                dstnode,
                srcnode,
                rqr: bits(flags, 3, 1) != 0,
                rts: bits(flags, 4, 1) != 0,
                visit,
            },
            ie: bits(flags, 5, 1) != 0,
            payload: r.rest().to_vec(),
        })
    }
}
