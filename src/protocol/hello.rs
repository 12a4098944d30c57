//! LAN hello messages: router hello with its router/state list, and
//! endnode hello.

use super::codec::{bits, set_bits, Field, FieldType, Reader, Writer};
use super::control::{expect_header, ControlType};
use super::ProtocolError;
use crate::identity::{MacAddr, NodeId, NodeType, Version, HIORD};

/// Size of one router/state list entry.
pub const RS_ENTRY_SIZE: usize = 7;

/// Maximum encoded router/state list.
pub const RSLIST_MAX: usize = 236;

/// Maximum encoded E-list (7 reserved bytes plus the R/S-list image).
pub const ELIST_MAX: usize = 244;

fn read_hiid(r: &mut Reader<'_>) -> Result<(), ProtocolError> {
    let hiid: [u8; 4] = r.array()?;
    if hiid != HIORD {
        return Err(ProtocolError::Malformed(format!(
            "unexpected hiid {}",
            hex::encode(hiid)
        )));
    }
    Ok(())
}

fn node_type(flags: u8) -> NodeType {
    NodeType::from_wire(bits(flags, 0, 2)).unwrap_or(NodeType::Endnode)
}

// ============================================================================
// Router/State List
// ============================================================================

/// One router heard by the sender of a router hello.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RsEntry {
    pub router: NodeId,
    pub priority: u8,
    /// The sender has heard this router and is listed by it.
    pub twoway: bool,
}

impl RsEntry {
    fn write(&self, w: &mut Writer) {
        w.bytes(&HIORD)
            .node(self.router)
            .u8(set_bits(self.priority, 0, 7) | set_bits(self.twoway as u8, 7, 1));
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        read_hiid(r)?;
        let router = r.node()?;
        let flags = r.u8()?;
        Ok(Self {
            router,
            priority: bits(flags, 0, 7),
            twoway: bits(flags, 7, 1) != 0,
        })
    }
}

// ============================================================================
// Router Hello
// ============================================================================

/// Broadcast router hello.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterHello {
    pub tiver: Version,
    pub id: NodeId,
    pub ntype: NodeType,
    pub blksize: u16,
    pub priority: u8,
    pub timer: u16,
    pub rslist: Vec<RsEntry>,
}

impl RouterHello {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("control", FieldType::Flags),
        Field::new("tiver", FieldType::Version),
        Field::new("hiid", FieldType::Bytes(4)),
        Field::new("id", FieldType::Node),
        Field::new("iinfo", FieldType::Flags),
        Field::new("blksize", FieldType::U16),
        Field::new("priority", FieldType::U8),
        Field::new("area", FieldType::U8),
        Field::new("timer", FieldType::U16),
        Field::new("mpd", FieldType::U8),
        Field::new("elist", FieldType::Image(ELIST_MAX)),
    ];

    /// Largest number of routers a single hello can list.
    pub const MAX_ROUTERS: usize = RSLIST_MAX / RS_ENTRY_SIZE;

    pub fn encode(&self) -> Vec<u8> {
        let mut rs = Writer::with_capacity(self.rslist.len() * RS_ENTRY_SIZE);
        for entry in self.rslist.iter().take(Self::MAX_ROUTERS) {
            entry.write(&mut rs);
        }
        let rs = rs.finish();
        let mut elist = Writer::with_capacity(8 + rs.len());
        elist.zeros(7).image(&rs, RSLIST_MAX);
        let elist = elist.finish();

        let mut w = Writer::with_capacity(19 + elist.len());
        w.u8(ControlType::RouterHello.to_byte())
            .version(self.tiver)
            .bytes(&HIORD)
            .node(self.id)
            .u8(set_bits(self.ntype.to_wire(), 0, 2))
            .u16(self.blksize)
            .u8(self.priority)
            .u8(0)
            .u16(self.timer)
            .u8(0)
            .image(&elist, ELIST_MAX);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        expect_header(&mut r, ControlType::RouterHello)?;
        let tiver = r.version()?;
        read_hiid(&mut r)?;
        let id = r.node()?;
        let flags = r.u8()?;
        let blksize = r.u16()?;
        let priority = r.u8()?;
        r.skip(1)?;
        let timer = r.u16()?;
        r.skip(1)?;
        let elist = r.image("elist", ELIST_MAX)?;
        r.finish()?;

        let mut er = Reader::new(&elist);
        er.skip(7)?;
        let rs = er.image("rslist", RSLIST_MAX)?;
        er.finish()?;
        if rs.len() % RS_ENTRY_SIZE != 0 {
            return Err(ProtocolError::Malformed(format!(
                "router list length {} not a multiple of {}",
                rs.len(),
                RS_ENTRY_SIZE
            )));
        }
        let mut rr = Reader::new(&rs);
        let mut rslist = Vec::with_capacity(rs.len() / RS_ENTRY_SIZE);
        while !rr.is_empty() {
            rslist.push(RsEntry::read(&mut rr)?);
        }

        Ok(Self {
            tiver,
            id,
            ntype: node_type(flags),
            blksize,
            priority,
            timer,
            rslist,
        })
    }
}

// ============================================================================
// Endnode Hello
// ============================================================================

/// Broadcast endnode hello.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndnodeHello {
    pub tiver: Version,
    pub id: NodeId,
    pub ntype: NodeType,
    pub blksize: u16,
    /// Station address of the designated router known to the sender.
    pub neighbor: MacAddr,
    pub timer: u16,
    pub testdata: Vec<u8>,
}

impl EndnodeHello {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("control", FieldType::Flags),
        Field::new("tiver", FieldType::Version),
        Field::new("hiid", FieldType::Bytes(4)),
        Field::new("id", FieldType::Node),
        Field::new("iinfo", FieldType::Flags),
        Field::new("blksize", FieldType::U16),
        Field::new("area_seed", FieldType::Bytes(9)),
        Field::new("neighbor", FieldType::Bytes(6)),
        Field::new("timer", FieldType::U16),
        Field::new("mpd", FieldType::U8),
        Field::new("testdata", FieldType::Image(128)),
    ];

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(32 + self.testdata.len());
        w.u8(ControlType::EndnodeHello.to_byte())
            .version(self.tiver)
            .bytes(&HIORD)
            .node(self.id)
            .u8(set_bits(self.ntype.to_wire(), 0, 2))
            .u16(self.blksize)
            .zeros(9)
            .bytes(self.neighbor.as_bytes())
            .u16(self.timer)
            .u8(0)
            .image(&self.testdata, 128);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        expect_header(&mut r, ControlType::EndnodeHello)?;
        let tiver = r.version()?;
        read_hiid(&mut r)?;
        let id = r.node()?;
        let flags = r.u8()?;
        let blksize = r.u16()?;
        r.skip(9)?;
        let neighbor = MacAddr::from_bytes(r.array()?);
        let timer = r.u16()?;
        r.skip(1)?;
        let testdata = r.image("testdata", 128)?;
        r.finish()?;
        Ok(Self {
            tiver,
            id,
            ntype: node_type(flags),
            blksize,
            neighbor,
            timer,
            testdata,
        })
    }
}
