//! Field-level encoding helpers shared by all packet kinds.
//!
//! Every packet kind declares its wire layout once as a slice of [`Field`]
//! descriptors (see [`PacketKind::layout`](super::PacketKind::layout)). The
//! layout gives the minimum encoded length used for the strict length check
//! before decoding, and documents the field order. The typed packet structs
//! then read and write their fields in that order through [`Reader`] and
//! [`Writer`].
//!
//! Field types used by DECnet routing packets:
//!
//! | Type | Encoding |
//! |------|----------|
//! | `U8`, `U16` | fixed width little-endian integer |
//! | `Node` | 2-byte node address |
//! | `Version` | 3-byte version triple |
//! | `Bytes(n)` | fixed n-byte string |
//! | `Image(max)` | 1-byte count followed by up to `max` bytes |
//! | `Extensible(max)` | 7 bits per byte, high bit set on all but the last |
//! | `Flags` | one byte of bit fields |
//! | `Repeated` | nested groups until the end of the enclosing field |
//! | `Payload` | remaining bytes, opaque |

use super::ProtocolError;
use crate::identity::{NodeId, Version};

/// Wire type of a single field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    U8,
    U16,
    Node,
    Version,
    Bytes(usize),
    Image(usize),
    Extensible(usize),
    Flags,
    Repeated,
    Payload,
}

impl FieldType {
    /// Smallest number of bytes this field can occupy.
    pub const fn min_len(self) -> usize {
        match self {
            FieldType::U8 | FieldType::Flags => 1,
            FieldType::U16 | FieldType::Node => 2,
            FieldType::Version => 3,
            FieldType::Bytes(n) => n,
            FieldType::Image(_) | FieldType::Extensible(_) => 1,
            FieldType::Repeated | FieldType::Payload => 0,
        }
    }
}

/// One named field in a packet layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
}

impl Field {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty }
    }
}

/// Minimum encoded length of a layout.
pub const fn min_len(layout: &[Field]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < layout.len() {
        total += layout[i].ty.min_len();
        i += 1;
    }
    total
}

/// Extract `width` bits starting at bit `shift`.
pub fn bits(byte: u8, shift: u8, width: u8) -> u8 {
    (byte >> shift) & ((1u16 << width) - 1) as u8
}

/// Place `value` into `width` bits starting at bit `shift`.
pub fn set_bits(value: u8, shift: u8, width: u8) -> u8 {
    (value & ((1u16 << width) - 1) as u8) << shift
}

// ============================================================================
// Reader
// ============================================================================

/// Strict cursor over a received buffer.
///
/// Every read checks the remaining length; a short buffer is an error,
/// never a silent truncation.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::MessageTooShort {
                expected: self.pos + n,
                got: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn node(&mut self) -> Result<NodeId, ProtocolError> {
        let b = self.take(2)?;
        Ok(NodeId::from_bytes([b[0], b[1]]))
    }

    pub fn version(&mut self) -> Result<Version, ProtocolError> {
        let b = self.take(3)?;
        Ok(Version::from_bytes([b[0], b[1], b[2]]))
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.take(n)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let b = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(b);
        Ok(out)
    }

    /// Skip reserved bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.take(n).map(|_| ())
    }

    /// Counted byte string with at most `max` bytes.
    pub fn image(&mut self, field: &'static str, max: usize) -> Result<Vec<u8>, ProtocolError> {
        let len = self.u8()? as usize;
        if len > max {
            return Err(ProtocolError::FieldTooLong { field, max, got: len });
        }
        Ok(self.take(len)?.to_vec())
    }

    /// Extensible integer of at most `max` bytes.
    pub fn extensible(&mut self, field: &'static str, max: usize) -> Result<u32, ProtocolError> {
        let mut value = 0u32;
        for i in 0..max {
            let b = self.u8()?;
            value |= ((b & 0x7f) as u32) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::FieldTooLong { field, max, got: max + 1 })
    }

    /// Everything left, as an opaque payload.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    /// Fail if any bytes remain.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Append-only encoder.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self { buf: Vec::with_capacity(n) }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn node(&mut self, id: NodeId) -> &mut Self {
        self.buf.extend_from_slice(&id.to_bytes());
        self
    }

    pub fn version(&mut self, v: Version) -> &mut Self {
        self.buf.extend_from_slice(&v.to_bytes());
        self
    }

    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(b);
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + n, 0);
        self
    }

    /// Counted byte string; data beyond `max` bytes is cut off.
    pub fn image(&mut self, data: &[u8], max: usize) -> &mut Self {
        let len = data.len().min(max).min(255);
        self.buf.push(len as u8);
        self.buf.extend_from_slice(&data[..len]);
        self
    }

    pub fn extensible(&mut self, mut value: u32) -> &mut Self {
        while value >> 7 != 0 {
            self.buf.push((value & 0x7f) as u8 | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_roundtrip() {
        let byte = set_bits(2, 0, 3) | set_bits(1, 3, 1) | set_bits(1, 6, 1);
        assert_eq!(byte, 0x4a);
        assert_eq!(bits(byte, 0, 3), 2);
        assert_eq!(bits(byte, 3, 1), 1);
        assert_eq!(bits(byte, 4, 1), 0);
        assert_eq!(bits(0xff, 10 - 10, 7), 0x7f);
    }

    #[test]
    fn test_reader_strict_length() {
        let mut r = Reader::new(&[1, 2, 3]);
        assert_eq!(r.u16().unwrap(), 0x0201);
        assert_eq!(
            r.u16(),
            Err(ProtocolError::MessageTooShort { expected: 4, got: 3 })
        );
    }

    #[test]
    fn test_image_limits() {
        let mut r = Reader::new(&[3, b'a', b'b', b'c']);
        assert_eq!(r.image("name", 6).unwrap(), b"abc");
        r.finish().unwrap();

        let mut r = Reader::new(&[7, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            r.image("name", 6),
            Err(ProtocolError::FieldTooLong { max: 6, got: 7, .. })
        ));

        let mut r = Reader::new(&[5, b'a']);
        assert!(matches!(r.image("name", 6), Err(ProtocolError::MessageTooShort { .. })));
    }

    #[test]
    fn test_extensible() {
        let mut w = Writer::new();
        w.extensible(0x42).extensible(300);
        let buf = w.finish();
        assert_eq!(buf, vec![0x42, 0xac, 0x02]);

        let mut r = Reader::new(&buf);
        assert_eq!(r.extensible("a", 2).unwrap(), 0x42);
        assert_eq!(r.extensible("b", 2).unwrap(), 300);

        let mut r = Reader::new(&[0x80, 0x80, 0x01]);
        assert!(r.extensible("c", 2).is_err());
    }

    #[test]
    fn test_layout_min_len() {
        const LAYOUT: &[Field] = &[
            Field::new("flags", FieldType::Flags),
            Field::new("dst", FieldType::Node),
            Field::new("name", FieldType::Image(6)),
            Field::new("payload", FieldType::Payload),
        ];
        assert_eq!(min_len(LAYOUT), 4);
    }
}
