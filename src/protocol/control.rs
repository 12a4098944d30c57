//! Point-to-point control messages: Init, Verify and Hello.

use std::fmt;

use super::codec::{bits, set_bits, Field, FieldType, Reader, Writer};
use super::ProtocolError;
use crate::identity::{NodeId, NodeType, Version};

/// Test data carried in hello messages.
pub const TEST_DATA_BYTE: u8 = 0xaa;

/// True if `data` consists only of hello test data bytes.
pub fn is_test_data(data: &[u8]) -> bool {
    data.iter().all(|&b| b == TEST_DATA_BYTE)
}

// ============================================================================
// Control Header
// ============================================================================

/// Routing control message types (bits 1-3 of the control header).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlType {
    Init = 0,
    Verify = 1,
    Hello = 2,
    L1Routing = 3,
    L2Routing = 4,
    RouterHello = 5,
    EndnodeHello = 6,
}

impl ControlType {
    /// Decode a control header byte. Returns `None` for data packets and
    /// unknown types.
    pub fn from_byte(b: u8) -> Option<Self> {
        if b & 0x01 == 0 || b & 0x80 != 0 || bits(b, 4, 3) != 0 {
            return None;
        }
        match bits(b, 1, 3) {
            0 => Some(ControlType::Init),
            1 => Some(ControlType::Verify),
            2 => Some(ControlType::Hello),
            3 => Some(ControlType::L1Routing),
            4 => Some(ControlType::L2Routing),
            5 => Some(ControlType::RouterHello),
            6 => Some(ControlType::EndnodeHello),
            _ => None,
        }
    }

    /// Control header byte for this type.
    pub fn to_byte(self) -> u8 {
        0x01 | set_bits(self as u8, 1, 3)
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlType::Init => "Init",
            ControlType::Verify => "Verify",
            ControlType::Hello => "Hello",
            ControlType::L1Routing => "L1Routing",
            ControlType::L2Routing => "L2Routing",
            ControlType::RouterHello => "RouterHello",
            ControlType::EndnodeHello => "EndnodeHello",
        };
        write!(f, "{}", name)
    }
}

/// Read and check the control header byte.
pub(crate) fn expect_header(r: &mut Reader<'_>, ty: ControlType) -> Result<(), ProtocolError> {
    let b = r.u8()?;
    if ControlType::from_byte(b) != Some(ty) {
        return Err(ProtocolError::InvalidMessageType(b));
    }
    Ok(())
}

fn node_type(flags: u8) -> NodeType {
    // two bits always map onto one of the four wire codes
    NodeType::from_wire(bits(flags, 0, 2)).unwrap_or(NodeType::Endnode)
}

// ============================================================================
// Init
// ============================================================================

/// Phase IV point-to-point initialization message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PtpInit {
    pub srcnode: NodeId,
    pub ntype: NodeType,
    /// Sender requests a verification message.
    pub verif: bool,
    /// Blocking requested.
    pub blo: bool,
    pub blksize: u16,
    pub tiver: Version,
    /// Sender's hello timer in seconds.
    pub timer: u16,
    pub reserved: Vec<u8>,
}

impl PtpInit {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("control", FieldType::Flags),
        Field::new("srcnode", FieldType::Node),
        Field::new("tiinfo", FieldType::Flags),
        Field::new("blksize", FieldType::U16),
        Field::new("tiver", FieldType::Version),
        Field::new("timer", FieldType::U16),
        Field::new("reserved", FieldType::Image(64)),
    ];

    pub fn new(srcnode: NodeId, ntype: NodeType, verif: bool, blksize: u16, timer: u16) -> Self {
        Self {
            srcnode,
            ntype,
            verif,
            blo: false,
            blksize,
            tiver: Version::PHASE4,
            timer,
            reserved: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(12);
        w.u8(ControlType::Init.to_byte())
            .node(self.srcnode)
            .u8(set_bits(self.ntype.to_wire(), 0, 2)
                | set_bits(self.verif as u8, 2, 1)
                | set_bits(self.blo as u8, 3, 1))
            .u16(self.blksize)
            .version(self.tiver)
            .u16(self.timer)
            .image(&self.reserved, 64);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        expect_header(&mut r, ControlType::Init)?;
        let srcnode = r.node()?;
        let flags = r.u8()?;
        let blksize = r.u16()?;
        let tiver = r.version()?;
        let timer = r.u16()?;
        let reserved = r.image("reserved", 64)?;
        r.finish()?;
        Ok(Self {
            srcnode,
            ntype: node_type(flags),
            verif: bits(flags, 2, 1) != 0,
            blo: bits(flags, 3, 1) != 0,
            blksize,
            tiver,
            timer,
            reserved,
        })
    }
}

/// Phase III point-to-point initialization message (no hello timer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PtpInit3 {
    pub srcnode: NodeId,
    pub ntype: NodeType,
    pub verif: bool,
    pub blksize: u16,
    pub tiver: Version,
    pub reserved: Vec<u8>,
}

impl PtpInit3 {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("control", FieldType::Flags),
        Field::new("srcnode", FieldType::Node),
        Field::new("tiinfo", FieldType::Flags),
        Field::new("blksize", FieldType::U16),
        Field::new("tiver", FieldType::Version),
        Field::new("reserved", FieldType::Image(64)),
    ];

    pub fn new(srcnode: NodeId, ntype: NodeType, verif: bool, blksize: u16) -> Self {
        Self {
            srcnode,
            ntype,
            verif,
            blksize,
            tiver: Version::PHASE3,
            reserved: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(10);
        w.u8(ControlType::Init.to_byte())
            .node(self.srcnode)
            .u8(set_bits(self.ntype.to_wire(), 0, 2) | set_bits(self.verif as u8, 2, 1))
            .u16(self.blksize)
            .version(self.tiver)
            .image(&self.reserved, 64);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        expect_header(&mut r, ControlType::Init)?;
        let srcnode = r.node()?;
        let flags = r.u8()?;
        let blksize = r.u16()?;
        let tiver = r.version()?;
        let reserved = r.image("reserved", 64)?;
        r.finish()?;
        Ok(Self {
            srcnode,
            ntype: node_type(flags),
            verif: bits(flags, 2, 1) != 0,
            blksize,
            tiver,
            reserved,
        })
    }
}

/// Offset of the version triple in both Init formats.
pub(crate) const INIT_TIVER_OFFSET: usize = 6;

// ============================================================================
// Verify
// ============================================================================

/// Point-to-point verification message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PtpVerify {
    pub srcnode: NodeId,
    pub fcnval: Vec<u8>,
}

impl PtpVerify {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("control", FieldType::Flags),
        Field::new("srcnode", FieldType::Node),
        Field::new("fcnval", FieldType::Image(64)),
    ];

    pub fn new(srcnode: NodeId, fcnval: &[u8]) -> Self {
        Self {
            srcnode,
            fcnval: fcnval.to_vec(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(4 + self.fcnval.len());
        w.u8(ControlType::Verify.to_byte())
            .node(self.srcnode)
            .image(&self.fcnval, 64);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        expect_header(&mut r, ControlType::Verify)?;
        let srcnode = r.node()?;
        let fcnval = r.image("fcnval", 64)?;
        r.finish()?;
        Ok(Self { srcnode, fcnval })
    }
}

// ============================================================================
// Hello
// ============================================================================

/// Point-to-point hello and test message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PtpHello {
    pub srcnode: NodeId,
    pub testdata: Vec<u8>,
}

impl PtpHello {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("control", FieldType::Flags),
        Field::new("srcnode", FieldType::Node),
        Field::new("testdata", FieldType::Image(128)),
    ];

    pub fn new(srcnode: NodeId, len: usize) -> Self {
        Self {
            srcnode,
            testdata: vec![TEST_DATA_BYTE; len.min(128)],
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(4 + self.testdata.len());
        w.u8(ControlType::Hello.to_byte())
            .node(self.srcnode)
            .image(&self.testdata, 128);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        expect_header(&mut r, ControlType::Hello)?;
        let srcnode = r.node()?;
        let testdata = r.image("testdata", 128)?;
        r.finish()?;
        Ok(Self { srcnode, testdata })
    }
}
