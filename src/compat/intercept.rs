//! Phase II intercept.
//!
//! Phase II nodes cannot route. A node that offers intercept routes on
//! their behalf: Phase II frames name their destination in a route
//! header, and NSP connect messages open a relay entry so that later
//! frames of the same logical link, which usually omit the route header,
//! still reach the right destination. A node that requested intercept
//! does the reverse and puts route headers on traffic for nodes beyond
//! its Phase II neighbor.
//!
//! Everything here is a pure function of the frame, the node database
//! and the relay table; changes to the relay table come back as
//! [`RelayAction`]s for the dispatcher to apply, so that relay timers
//! stay in the node's timer wheel.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::InterceptRole;
use crate::circuit::Adjacency;
use crate::identity::{LocalNode, NodeDb, NodeId};
use crate::protocol::{
    disconnect_confirm, DataHeader, NspHeader, NspKind, RouteHeader, REASON_UNREACHABLE,
    ROUTE_HEADER_FLAG,
};

// ============================================================================
// Relay Table
// ============================================================================

/// A Phase II node's end of one logical link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelayKey {
    pub neighbor: NodeId,
    /// The Phase II node's logical link address.
    pub link: u16,
}

impl RelayKey {
    pub fn new(neighbor: NodeId, link: u16) -> Self {
        Self { neighbor, link }
    }
}

/// Change to apply to the relay table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayAction {
    Open(RelayKey, NodeId),
    Close(RelayKey),
    /// The entry carried traffic; restart its idle timer.
    Touch(RelayKey),
}

/// Destinations of the logical links relayed for Phase II neighbors.
#[derive(Clone, Debug, Default)]
pub struct Relays {
    entries: HashMap<RelayKey, NodeId>,
}

impl Relays {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RelayKey) -> Option<NodeId> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: RelayKey, dst: NodeId) {
        self.entries.insert(key, dst);
    }

    pub fn remove(&mut self, key: &RelayKey) -> Option<NodeId> {
        self.entries.remove(key)
    }

    /// Drop every entry of `neighbor`, returning the removed keys.
    pub fn remove_neighbor(&mut self, neighbor: NodeId) -> Vec<RelayKey> {
        let keys: Vec<RelayKey> = self
            .entries
            .keys()
            .filter(|k| k.neighbor == neighbor)
            .copied()
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Link Context
// ============================================================================

/// One Phase II adjacency, as seen by intercept.
pub struct Phase2Link<'a> {
    pub local: &'a LocalNode,
    pub nodes: &'a NodeDb,
    pub adj: &'a Adjacency,
    pub role: InterceptRole,
}

impl Phase2Link<'_> {
    fn neighbor_name(&self) -> &str {
        self.adj.name.as_deref().unwrap_or("")
    }

    fn name_of(&self, id: NodeId) -> Option<String> {
        if id == self.local.id() {
            return Some(self.local.name().to_string());
        }
        if id == self.adj.neighbor {
            if let Some(name) = &self.adj.name {
                return Some(name.clone());
            }
        }
        self.nodes.name_of(id).map(str::to_string)
    }

    fn map_src(&self, name: &str) -> Option<NodeId> {
        if name.is_empty() {
            return Some(self.adj.neighbor);
        }
        match self.role {
            InterceptRole::Endnode => self.nodes.id_of(name),
            _ if name == self.neighbor_name() => Some(self.adj.neighbor),
            _ => None,
        }
    }

    fn map_dst(&self, name: &str) -> Option<NodeId> {
        if name.is_empty() || name == self.local.name() {
            return Some(self.local.id());
        }
        match self.role {
            InterceptRole::Full => self.nodes.id_of(name),
            _ => None,
        }
    }

    /// A Disconnect Confirm with reason "unreachable" answering an NSP
    /// message that went from `src` to `dst`. Never answers a Disconnect
    /// Confirm. The route header is only added for neighbors that asked
    /// for intercept.
    fn unreachable_reply(&self, src: &str, dst: &str, nsp: &[u8]) -> Option<Vec<u8>> {
        let hdr = NspHeader::decode(nsp).ok()?;
        if hdr.kind == NspKind::DisconnectConfirm {
            trace!(neighbor = %self.adj.neighbor, "Not answering disconnect confirm");
            return None;
        }
        let dc = disconnect_confirm(&hdr, REASON_UNREACHABLE);
        if self.adj.rint == 0 {
            return Some(dc);
        }
        Some(
            RouteHeader {
                dstnode: src.to_string(),
                srcnode: dst.to_string(),
                payload: dc,
            }
            .encode(),
        )
    }
}

// ============================================================================
// Receive
// ============================================================================

/// Result of receiving a frame from a Phase II neighbor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase2Inbound {
    /// Routed data, to be delivered or forwarded.
    Data { header: DataHeader, payload: Vec<u8> },
    /// Send this frame back to the neighbor.
    Reply(Vec<u8>),
    Discard,
}

/// Turn a frame from a Phase II neighbor (route header or bare NSP) into
/// routed data.
pub fn phase2_receive(
    link: &Phase2Link<'_>,
    relays: &Relays,
    frame: &[u8],
) -> (Phase2Inbound, Option<RelayAction>) {
    let neighbor = link.adj.neighbor;
    if frame.first() == Some(&ROUTE_HEADER_FLAG) {
        let rh = match RouteHeader::decode(frame) {
            Ok(rh) => rh,
            Err(e) => {
                debug!(neighbor = %neighbor, error = %e, "Malformed route header");
                return (Phase2Inbound::Discard, None);
            }
        };
        let (Some(src), Some(dst)) = (link.map_src(&rh.srcnode), link.map_dst(&rh.dstnode))
        else {
            debug!(
                neighbor = %neighbor,
                src = %rh.srcnode,
                dst = %rh.dstnode,
                "Unexpected route header addresses"
            );
            return match link.unreachable_reply(&rh.srcnode, &rh.dstnode, &rh.payload) {
                Some(reply) => (Phase2Inbound::Reply(reply), None),
                None => (Phase2Inbound::Discard, None),
            };
        };
        let action = match (link.role, NspHeader::decode(&rh.payload)) {
            (InterceptRole::Full, Ok(nsp)) => {
                let key = RelayKey::new(neighbor, nsp.srcaddr);
                match nsp.kind {
                    NspKind::ConnectInit | NspKind::ConnectConfirm if dst != link.local.id() => {
                        Some(RelayAction::Open(key, dst))
                    }
                    NspKind::DisconnectInit | NspKind::DisconnectConfirm => {
                        Some(RelayAction::Close(key))
                    }
                    _ => None,
                }
            }
            _ => None,
        };
        return (data(src, dst, rh.payload), action);
    }

    let mut dst = link.local.id();
    let mut action = None;
    if link.role == InterceptRole::Full {
        if let Ok(nsp) = NspHeader::decode(frame) {
            let key = RelayKey::new(neighbor, nsp.srcaddr);
            if nsp.kind == NspKind::Ack {
                if let Some(relayed) = relays.get(&key) {
                    dst = relayed;
                    action = Some(RelayAction::Touch(key));
                }
            }
        }
    }
    (data(neighbor, dst, frame.to_vec()), action)
}

fn data(src: NodeId, dst: NodeId, payload: Vec<u8>) -> Phase2Inbound {
    Phase2Inbound::Data {
        header: DataHeader::new(src, dst, true),
        payload,
    }
}

// ============================================================================
// Send
// ============================================================================

/// Result of routing data towards a Phase II neighbor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase2Outbound {
    Frame(Vec<u8>),
    /// The neighbor cannot take this packet; treat the destination as
    /// unreachable.
    Unreachable,
    Discard,
}

/// Convert routed data for transmission to a Phase II neighbor.
pub fn phase2_send(
    link: &Phase2Link<'_>,
    header: &DataHeader,
    payload: &[u8],
) -> (Phase2Outbound, Vec<RelayAction>) {
    let neighbor = link.adj.neighbor;
    let local = link.local.id();

    if header.rts {
        let reply = match (link.name_of(header.srcnode), link.name_of(header.dstnode)) {
            (Some(src), Some(dst)) => link.unreachable_reply(&src, &dst, payload),
            _ => None,
        };
        let out = reply.map_or(Phase2Outbound::Discard, Phase2Outbound::Frame);
        return (out, Vec::new());
    }

    match link.role {
        InterceptRole::None => {
            if header.dstnode != neighbor || header.srcnode != local {
                return (Phase2Outbound::Unreachable, Vec::new());
            }
            (Phase2Outbound::Frame(payload.to_vec()), Vec::new())
        }
        InterceptRole::Full => {
            if header.dstnode != neighbor {
                return (Phase2Outbound::Unreachable, Vec::new());
            }
            let nsp = match NspHeader::decode(payload) {
                Ok(nsp) => nsp,
                Err(e) => {
                    debug!(neighbor = %neighbor, error = %e, "Malformed NSP message for Phase II neighbor");
                    return (Phase2Outbound::Discard, Vec::new());
                }
            };
            let mut actions = Vec::new();
            if matches!(nsp.kind, NspKind::DisconnectInit | NspKind::DisconnectConfirm) {
                actions.push(RelayAction::Close(RelayKey::new(neighbor, nsp.srcaddr)));
                actions.push(RelayAction::Close(RelayKey::new(neighbor, nsp.dstaddr)));
            }
            if header.srcnode == local || nsp.kind == NspKind::Ack {
                return (Phase2Outbound::Frame(payload.to_vec()), actions);
            }
            match (link.name_of(header.srcnode), link.name_of(header.dstnode)) {
                (Some(src), Some(dst)) => {
                    let frame = RouteHeader {
                        dstnode: dst,
                        srcnode: src,
                        payload: payload.to_vec(),
                    }
                    .encode();
                    (Phase2Outbound::Frame(frame), actions)
                }
                _ => (Phase2Outbound::Discard, actions),
            }
        }
        InterceptRole::Endnode => {
            if header.srcnode != local {
                return (Phase2Outbound::Unreachable, Vec::new());
            }
            if header.dstnode == neighbor {
                return (Phase2Outbound::Frame(payload.to_vec()), Vec::new());
            }
            match link.name_of(header.dstnode) {
                Some(dst) => {
                    let frame = RouteHeader {
                        dstnode: dst,
                        srcnode: link.local.name().to_string(),
                        payload: payload.to_vec(),
                    }
                    .encode();
                    (Phase2Outbound::Frame(frame), Vec::new())
                }
                None => (Phase2Outbound::Unreachable, Vec::new()),
            }
        }
    }
}
