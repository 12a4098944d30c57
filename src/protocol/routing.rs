//! Routing messages: level 1 and level 2 segmented vectors, and the
//! unsegmented Phase III form.

use super::codec::{Field, FieldType, Reader, Writer};
use super::control::{expect_header, ControlType};
use super::ProtocolError;
use crate::identity::NodeId;

/// Hop count meaning "unreachable".
pub const INFINITE_HOPS: u8 = 31;

/// Cost meaning "unreachable".
pub const INFINITE_COST: u16 = 1023;

/// Routing message header: control, srcnode, reserved.
const HEADER_LEN: usize = 4;

/// Segment header: count, startid.
const SEGMENT_HEADER_LEN: usize = 4;

/// Checksum trailer.
const CHECKSUM_LEN: usize = 2;

// ============================================================================
// Entries and Segments
// ============================================================================

/// Cost and hops advertised for one destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RouteEntry {
    pub cost: u16,
    pub hops: u8,
}

impl RouteEntry {
    pub const INFINITE: RouteEntry = RouteEntry {
        cost: INFINITE_COST,
        hops: INFINITE_HOPS,
    };

    pub fn new(cost: u16, hops: u8) -> Self {
        Self {
            cost: cost.min(INFINITE_COST),
            hops: hops.min(INFINITE_HOPS),
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.cost >= INFINITE_COST || self.hops >= INFINITE_HOPS
    }

    /// Wire form: cost in bits 0-9, hops in bits 10-14.
    pub fn to_word(self) -> u16 {
        (self.cost & 0x3ff) | ((self.hops as u16 & 0x1f) << 10)
    }

    pub fn from_word(w: u16) -> Self {
        Self {
            cost: w & 0x3ff,
            hops: ((w >> 10) & 0x1f) as u8,
        }
    }

    /// The entry as seen one hop further away over a circuit of `cost`.
    pub fn via(self, circuit_cost: u16) -> Self {
        Self {
            cost: self.cost.saturating_add(circuit_cost),
            hops: self.hops.saturating_add(1),
        }
    }
}

/// A contiguous run of entries starting at `start`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start: u16,
    pub entries: Vec<RouteEntry>,
}

impl Segment {
    pub fn new(start: u16, entries: Vec<RouteEntry>) -> Self {
        Self { start, entries }
    }

    /// Encoded size of this segment.
    pub fn wire_len(&self) -> usize {
        SEGMENT_HEADER_LEN + 2 * self.entries.len()
    }
}

/// Which id space a segmented routing message covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Level {
    Nodes,
    Areas,
}

impl Level {
    fn control(self) -> ControlType {
        match self {
            Level::Nodes => ControlType::L1Routing,
            Level::Areas => ControlType::L2Routing,
        }
    }

    fn segment_valid(self, start: u16, count: u16) -> bool {
        let end = start as u32 + count as u32;
        match self {
            Level::Nodes => count != 0 && end <= 1024,
            Level::Areas => count != 0 && start != 0 && end <= 64,
        }
    }
}

// ============================================================================
// Checksum
// ============================================================================

/// Routing message checksum: sum of little-endian words starting from
/// `init`, with end-around carry.
pub fn checksum(init: u16, data: &[u8]) -> u16 {
    let mut s: u32 = init as u32;
    for word in data.chunks(2) {
        let lo = word[0] as u32;
        let hi = word.get(1).copied().unwrap_or(0) as u32;
        s += lo | (hi << 8);
    }
    s = (s & 0xffff) + (s >> 16);
    s = (s & 0xffff) + (s >> 16);
    s as u16
}

/// Split off and verify the checksum trailer.
fn checked_body(init: u16, body: &[u8]) -> Result<&[u8], ProtocolError> {
    if body.len() < CHECKSUM_LEN || body.len() % 2 != 0 {
        return Err(ProtocolError::Malformed(format!(
            "routing message body length {}",
            body.len()
        )));
    }
    let (data, trailer) = body.split_at(body.len() - CHECKSUM_LEN);
    let received = u16::from_le_bytes([trailer[0], trailer[1]]);
    let computed = checksum(init, data);
    if computed != received {
        return Err(ProtocolError::ChecksumMismatch { computed, received });
    }
    Ok(data)
}

fn read_header(r: &mut Reader<'_>, ty: ControlType) -> Result<NodeId, ProtocolError> {
    expect_header(r, ty)?;
    let srcnode = r.node()?;
    r.skip(1)?;
    Ok(srcnode)
}

fn encode_segmented(level: Level, srcnode: NodeId, segments: &[Segment]) -> Vec<u8> {
    let mut body = Writer::new();
    for seg in segments {
        body.u16(seg.entries.len() as u16).u16(seg.start);
        for e in &seg.entries {
            body.u16(e.to_word());
        }
    }
    let body = body.finish();
    let mut w = Writer::with_capacity(HEADER_LEN + body.len() + CHECKSUM_LEN);
    w.u8(level.control().to_byte())
        .node(srcnode)
        .u8(0)
        .bytes(&body)
        .u16(checksum(1, &body));
    w.finish()
}

fn decode_segmented(level: Level, data: &[u8]) -> Result<(NodeId, Vec<Segment>), ProtocolError> {
    let mut r = Reader::new(data);
    let srcnode = read_header(&mut r, level.control())?;
    let body = checked_body(1, r.rest())?;
    let mut r = Reader::new(body);
    let mut segments = Vec::new();
    while !r.is_empty() {
        let count = r.u16()?;
        let start = r.u16()?;
        if !level.segment_valid(start, count) {
            return Err(ProtocolError::InvalidSegment { start, count });
        }
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(RouteEntry::from_word(r.u16()?));
        }
        segments.push(Segment { start, entries });
    }
    Ok((srcnode, segments))
}

fn flatten(segments: &[Segment]) -> impl Iterator<Item = (u16, RouteEntry)> + '_ {
    segments.iter().flat_map(|seg| {
        seg.entries
            .iter()
            .enumerate()
            .map(move |(i, e)| (seg.start + i as u16, *e))
    })
}

/// Split a dense vector (index = id) into segments whose encoded messages
/// fit in `blksize`.
///
/// Ids below `first` are skipped; each resulting message holds as many
/// whole segments as fit.
pub fn split_vector(
    vector: &[RouteEntry],
    first: u16,
    blksize: usize,
) -> Vec<Vec<Segment>> {
    let room = blksize
        .saturating_sub(HEADER_LEN + CHECKSUM_LEN + SEGMENT_HEADER_LEN)
        .max(2)
        / 2;
    let mut messages = Vec::new();
    let mut id = first as usize;
    while id < vector.len() {
        let end = (id + room).min(vector.len());
        messages.push(vec![Segment::new(id as u16, vector[id..end].to_vec())]);
        id = end;
    }
    messages
}

// ============================================================================
// Level 1 Routing
// ============================================================================

/// Level 1 routing message: per-node entries within the area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct L1Routing {
    pub srcnode: NodeId,
    pub segments: Vec<Segment>,
}

impl L1Routing {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("control", FieldType::Flags),
        Field::new("srcnode", FieldType::Node),
        Field::new("reserved", FieldType::U8),
        Field::new("segments", FieldType::Repeated),
        Field::new("checksum", FieldType::U16),
    ];

    pub fn encode(&self) -> Vec<u8> {
        encode_segmented(Level::Nodes, self.srcnode, &self.segments)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (srcnode, segments) = decode_segmented(Level::Nodes, data)?;
        Ok(Self { srcnode, segments })
    }

    /// (node number, entry) for every advertised node.
    pub fn entries(&self) -> impl Iterator<Item = (u16, RouteEntry)> + '_ {
        flatten(&self.segments)
    }
}

// ============================================================================
// Level 2 Routing
// ============================================================================

/// Level 2 routing message: per-area entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct L2Routing {
    pub srcnode: NodeId,
    pub segments: Vec<Segment>,
}

impl L2Routing {
    pub const LAYOUT: &'static [Field] = L1Routing::LAYOUT;

    pub fn encode(&self) -> Vec<u8> {
        encode_segmented(Level::Areas, self.srcnode, &self.segments)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (srcnode, segments) = decode_segmented(Level::Areas, data)?;
        Ok(Self { srcnode, segments })
    }

    /// (area number, entry) for every advertised area.
    pub fn entries(&self) -> impl Iterator<Item = (u16, RouteEntry)> + '_ {
        flatten(&self.segments)
    }
}

// ============================================================================
// Phase III Routing
// ============================================================================

/// Phase III routing message: entries for nodes 1..=n, no segment headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Phase3Routing {
    pub srcnode: NodeId,
    pub entries: Vec<RouteEntry>,
}

impl Phase3Routing {
    pub const LAYOUT: &'static [Field] = &[
        Field::new("control", FieldType::Flags),
        Field::new("srcnode", FieldType::Node),
        Field::new("reserved", FieldType::U8),
        Field::new("entries", FieldType::Repeated),
        Field::new("checksum", FieldType::U16),
    ];

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Writer::with_capacity(2 * self.entries.len());
        for e in &self.entries {
            body.u16(e.to_word());
        }
        let body = body.finish();
        let mut w = Writer::with_capacity(HEADER_LEN + body.len() + CHECKSUM_LEN);
        w.u8(ControlType::L1Routing.to_byte())
            .node(self.srcnode)
            .u8(0)
            .bytes(&body)
            .u16(checksum(0, &body));
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        let srcnode = read_header(&mut r, ControlType::L1Routing)?;
        let body = checked_body(0, r.rest())?;
        let mut r = Reader::new(body);
        let mut entries = Vec::with_capacity(body.len() / 2);
        while !r.is_empty() {
            entries.push(RouteEntry::from_word(r.u16()?));
        }
        Ok(Self { srcnode, entries })
    }

    /// (node number, entry) for every advertised node, starting at 1.
    pub fn entries(&self) -> impl Iterator<Item = (u16, RouteEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i as u16 + 1, *e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_word() {
        let e = RouteEntry::from_word(0x7fff);
        assert_eq!(e, RouteEntry::INFINITE);
        assert!(e.is_infinite());
        let e = RouteEntry::from_word(0x0806);
        assert_eq!(e, RouteEntry::new(6, 2));
        assert_eq!(e.to_word(), 0x0806);
        assert_eq!(e.via(5), RouteEntry::new(11, 3));
    }

    #[test]
    fn test_checksum_fold() {
        assert_eq!(checksum(1, &[0xff, 0xff]), 0x0001);
        assert_eq!(checksum(0, &[0xff, 0xff, 0x02, 0x00]), 0x0002);
    }

    #[test]
    fn test_split_vector() {
        let vector = vec![RouteEntry::new(1, 1); 1024];
        let msgs = split_vector(&vector, 0, 576);
        let total: usize = msgs.iter().flatten().map(|s| s.entries.len()).sum();
        assert_eq!(total, 1024);
        for msg in &msgs {
            let encoded = L1Routing {
                srcnode: NodeId::bare(1),
                segments: msg.clone(),
            }
            .encode();
            assert!(encoded.len() <= 576);
        }
        assert_eq!(msgs[0][0].start, 0);
        assert_eq!(msgs[1][0].start, msgs[0][0].entries.len() as u16);
    }
}
