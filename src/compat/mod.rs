//! Phase Compatibility
//!
//! Reconciles the three protocol generations at the edges of the
//! forwarding path:
//!
//! - Routing headers are localized on receipt and re-encoded per
//!   neighbor on transmission: long headers on LAN circuits, short
//!   headers on Phase IV point-to-point circuits, short headers with bare
//!   node numbers towards Phase III neighbors.
//! - Visit counts are bounded per packet: twice `maxvisits` once a packet
//!   is on its way back to its sender, never more than a short header
//!   can carry.
//! - Phase II neighbors get intercept service (see [`intercept`]).

pub mod intercept;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::circuit::Adjacency;
use crate::config::CircuitKind;
use crate::identity::{LocalNode, Phase};
use crate::protocol::{DataHeader, LongData, ShortData, INT_OFFER, MAX_SHORT_VISIT, RINT_REQUEST};

pub use intercept::{
    phase2_receive, phase2_send, Phase2Inbound, Phase2Link, Phase2Outbound, RelayAction,
    RelayKey, Relays,
};

// ============================================================================
// Intercept Negotiation
// ============================================================================

/// What this node does for Phase II neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterceptMode {
    /// Neither offer nor request intercept.
    None,
    /// Ask a Phase II neighbor to route for us.
    Request,
    /// Route on behalf of Phase II neighbors that ask.
    Offer,
}

impl InterceptMode {
    /// Intercept functions advertised in our Node Init.
    pub fn int_flags(self) -> u8 {
        match self {
            InterceptMode::Offer => INT_OFFER,
            _ => 0,
        }
    }

    /// Intercept request flags advertised in our Node Init.
    pub fn rint_flags(self) -> u8 {
        match self {
            InterceptMode::Request => RINT_REQUEST,
            _ => 0,
        }
    }
}

impl fmt::Display for InterceptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterceptMode::None => "none",
            InterceptMode::Request => "request",
            InterceptMode::Offer => "offer",
        };
        write!(f, "{}", s)
    }
}

/// Intercept behavior agreed with one Phase II neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptRole {
    /// Only traffic between us and the neighbor.
    None,
    /// We route for the neighbor.
    Full,
    /// The neighbor routes for us.
    Endnode,
}

impl InterceptRole {
    /// Combine our mode with the neighbor's advertised `int` (offered)
    /// and `rint` (requested) flags. A request that was answered by an
    /// offer takes precedence.
    pub fn negotiate(local: InterceptMode, int: u8, rint: u8) -> Self {
        let intfun = local == InterceptMode::Offer && rint != 0;
        let intreq = local == InterceptMode::Request && int != 0;
        if intreq {
            InterceptRole::Endnode
        } else if intfun {
            InterceptRole::Full
        } else {
            InterceptRole::None
        }
    }
}

impl fmt::Display for InterceptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterceptRole::None => "none",
            InterceptRole::Full => "full",
            InterceptRole::Endnode => "endnode",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Visit Policy
// ============================================================================

/// Highest visit count a packet may carry.
///
/// Capped at the short header's visit field so a count past the limit is
/// never clamped back under it on a point-to-point hop.
pub fn visit_limit(maxvisits: u8, rts: bool) -> u16 {
    let limit = if rts {
        2 * maxvisits as u16
    } else {
        maxvisits as u16
    };
    limit.min(MAX_SHORT_VISIT as u16)
}

/// True if the packet has been forwarded too many times.
pub fn is_aged(header: &DataHeader, maxvisits: u8) -> bool {
    header.visit as u16 > visit_limit(maxvisits, header.rts)
}

// ============================================================================
// Header Conversion
// ============================================================================

/// Interpret a received header in terms of our own addressing.
pub fn localize_header(local: &LocalNode, neighbor_phase: Phase, mut header: DataHeader) -> DataHeader {
    header.srcnode = local.localize(header.srcnode, neighbor_phase);
    header.dstnode = local.localize(header.dstnode, neighbor_phase);
    header
}

/// Encode routed data for a Phase III or Phase IV adjacency.
///
/// `ie` marks a LAN packet whose destination is on the same LAN. Returns
/// `None` when the addresses cannot be expressed in the neighbor's phase.
pub fn encode_data(
    local: &LocalNode,
    adj: &Adjacency,
    kind: CircuitKind,
    header: &DataHeader,
    ie: bool,
    payload: &[u8],
) -> Option<Vec<u8>> {
    match (kind, adj.phase) {
        (CircuitKind::Lan, _) => Some(LongData::new(*header, ie, payload.to_vec()).encode()),
        (CircuitKind::Ptp, Phase::Phase4) => {
            Some(ShortData::new(*header, payload.to_vec()).encode())
        }
        (CircuitKind::Ptp, Phase::Phase3) => {
            let area = local.area();
            if !header.srcnode.is_legacy_addressable(area)
                || !header.dstnode.is_legacy_addressable(area)
            {
                return None;
            }
            let mut h = *header;
            h.srcnode = h.srcnode.without_area();
            h.dstnode = h.dstnode.without_area();
            Some(ShortData::new(h, payload.to_vec()).encode())
        }
        (CircuitKind::Ptp, Phase::Phase2) => None,
    }
}
