//! 16-bit DECnet node address: 6-bit area and 10-bit node number.

use std::fmt;
use std::str::FromStr;

use super::{IdentityError, MAX_AREA, MAX_LEGACY_NODE, MAX_NODE};

/// DECnet node address.
///
/// The wire form is little-endian `(area << 10) | node`. Phase II and
/// Phase III addresses carry area 0; they are mapped into the local area
/// on receipt and stripped again on transmission to such neighbors.
///
/// Ordering follows the numeric value, so a higher area always compares
/// greater, and within an area a higher node number compares greater.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(u16);

impl NodeId {
    /// Create an address from an area and node number.
    pub fn new(area: u8, node: u16) -> Result<Self, IdentityError> {
        if area > MAX_AREA {
            return Err(IdentityError::AreaOutOfRange(area as u32));
        }
        if node > MAX_NODE {
            return Err(IdentityError::NodeOutOfRange(node as u32));
        }
        Ok(Self(((area as u16) << 10) | node))
    }

    /// Create an address from its raw 16-bit value.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Create a bare (area 0) address, as used by Phase II and III.
    pub const fn bare(node: u16) -> Self {
        Self(node & MAX_NODE)
    }

    /// Decode from the 2-byte little-endian wire form.
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }

    /// Encode to the 2-byte little-endian wire form.
    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// Raw 16-bit value.
    pub fn raw(self) -> u16 {
        self.0
    }

    /// Area number.
    pub fn area(self) -> u8 {
        (self.0 >> 10) as u8
    }

    /// Node number within the area.
    pub fn node(self) -> u16 {
        self.0 & MAX_NODE
    }

    /// True for the all-zero address.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The same node number, placed in `area`.
    pub fn with_area(self, area: u8) -> Self {
        Self(((area as u16 & 0x3f) << 10) | self.node())
    }

    /// The same node number with the area stripped.
    pub fn without_area(self) -> Self {
        Self(self.node())
    }

    /// Whether a Phase II or Phase III node can address this node when
    /// it lives in `local_area`.
    pub fn is_legacy_addressable(self, local_area: u8) -> bool {
        (self.area() == 0 || self.area() == local_area)
            && self.node() >= 1
            && self.node() <= MAX_LEGACY_NODE
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.area() == 0 {
            write!(f, "{}", self.node())
        } else {
            write!(f, "{}.{}", self.area(), self.node())
        }
    }
}

impl FromStr for NodeId {
    type Err = IdentityError;

    /// Parse `area.node` or a bare node number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdentityError::InvalidAddress(s.to_string());
        match s.split_once('.') {
            Some((area, node)) => {
                let area: u32 = area.trim().parse().map_err(|_| invalid())?;
                let node: u32 = node.trim().parse().map_err(|_| invalid())?;
                if area > MAX_AREA as u32 {
                    return Err(IdentityError::AreaOutOfRange(area));
                }
                if node > MAX_NODE as u32 {
                    return Err(IdentityError::NodeOutOfRange(node));
                }
                NodeId::new(area as u8, node as u16)
            }
            None => {
                let node: u32 = s.trim().parse().map_err(|_| invalid())?;
                if node > MAX_NODE as u32 {
                    return Err(IdentityError::NodeOutOfRange(node));
                }
                Ok(NodeId::bare(node as u16))
            }
        }
    }
}

impl serde::Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for NodeId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u16),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Number(n) if n <= MAX_NODE => Ok(NodeId::bare(n)),
            Repr::Number(n) => Err(serde::de::Error::custom(
                IdentityError::NodeOutOfRange(n as u32),
            )),
        }
    }
}
