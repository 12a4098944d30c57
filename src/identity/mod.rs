//! DECnet Node Identity
//!
//! Node addresses (area.node pairs, or bare node numbers for the Phase II
//! and Phase III generations), node types, routing layer versions, LAN
//! station addresses, and the immutable identity of the local node.

mod local;
mod node_id;
mod node_type;
mod nodedb;
mod station;
#[cfg(test)]
mod tests;

use thiserror::Error;

pub use local::{Limits, LocalNode};
pub use node_id::NodeId;
pub use node_type::{NodeType, Phase, Version};
pub use nodedb::{NodeDb, NodeRecord};
pub use station::{MacAddr, HIORD};

/// Highest valid area number.
pub const MAX_AREA: u8 = 63;

/// Highest valid node number within an area.
pub const MAX_NODE: u16 = 1023;

/// Highest node number addressable by Phase II and Phase III nodes.
pub const MAX_LEGACY_NODE: u16 = 255;

/// Errors that can occur in identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("area out of range: {0}")]
    AreaOutOfRange(u32),

    #[error("node number out of range: {0}")]
    NodeOutOfRange(u32),

    #[error("invalid node address '{0}'")]
    InvalidAddress(String),

    #[error("invalid node name '{0}': expected 1-6 alphanumeric characters")]
    InvalidName(String),

    #[error("invalid station address '{0}'")]
    InvalidStation(String),

    #[error("invalid station hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("node type {node_type} is not valid for {phase}")]
    TypeNotInPhase { node_type: NodeType, phase: Phase },

    #[error("duplicate node '{0}'")]
    DuplicateNode(String),

    #[error("address {id} is not valid for {phase}")]
    AddressNotInPhase { id: NodeId, phase: Phase },
}

/// Validate a node name: 1 to 6 characters, alphanumeric, at least one letter.
pub fn validate_node_name(name: &str) -> Result<(), IdentityError> {
    let ok = !name.is_empty()
        && name.len() <= 6
        && name.chars().all(|c| c.is_ascii_alphanumeric())
        && name.chars().any(|c| c.is_ascii_alphabetic());
    if ok {
        Ok(())
    } else {
        Err(IdentityError::InvalidName(name.to_string()))
    }
}
