//! 48-bit LAN station addresses.

use std::fmt;
use std::str::FromStr;

use super::{IdentityError, NodeId};

/// High-order prefix of a Phase IV node's station address.
pub const HIORD: [u8; 4] = [0xaa, 0x00, 0x04, 0x00];

/// 48-bit LAN station (MAC) address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// All-routers multicast.
    pub const ALL_ROUTERS: MacAddr = MacAddr([0xab, 0x00, 0x00, 0x03, 0x00, 0x00]);
    /// All-endnodes multicast.
    pub const ALL_ENDNODES: MacAddr = MacAddr([0xab, 0x00, 0x00, 0x04, 0x00, 0x00]);
    /// Null address (no neighbor).
    pub const NULL: MacAddr = MacAddr([0; 6]);

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Station address of a Phase IV node.
    pub fn from_node(id: NodeId) -> Self {
        let [lo, hi] = id.to_bytes();
        Self([HIORD[0], HIORD[1], HIORD[2], HIORD[3], lo, hi])
    }

    /// The DECnet address encoded in this station address, if it has the
    /// Phase IV prefix.
    pub fn node_id(&self) -> Option<NodeId> {
        if self.0[..4] == HIORD {
            Some(NodeId::from_bytes([self.0[4], self.0[5]]))
        } else {
            None
        }
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Multicast (group) bit.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 1 != 0
    }

    /// True for the null address.
    pub fn is_null(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}-{:02x}-{:02x}-{:02x}-{:02x}-{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = IdentityError;

    /// Parse `aa-00-04-00-05-04`, `aa:00:04:00:05:04` or plain hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != '-' && *c != ':').collect();
        let bytes = hex::decode(&digits)?;
        let bytes: [u8; 6] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidStation(s.to_string()))?;
        Ok(Self(bytes))
    }
}
