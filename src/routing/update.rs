//! Routing message construction from the advertised vectors.

use super::RoutingEngine;
use crate::identity::{NodeId, MAX_LEGACY_NODE};
use crate::protocol::{split_vector, L1Routing, L2Routing, Phase3Routing};

/// Level 1 routing messages covering nodes 0..=maxnodes, each fitting
/// in `blksize`.
pub fn l1_messages(engine: &RoutingEngine, srcnode: NodeId, blksize: u16) -> Vec<Vec<u8>> {
    split_vector(&engine.advertised_l1(), 0, blksize as usize)
        .into_iter()
        .map(|segments| L1Routing { srcnode, segments }.encode())
        .collect()
}

/// Level 2 routing messages covering areas 1..=maxarea.
pub fn l2_messages(engine: &RoutingEngine, srcnode: NodeId, blksize: u16) -> Vec<Vec<u8>> {
    split_vector(&engine.advertised_l2(), 1, blksize as usize)
        .into_iter()
        .map(|segments| L2Routing { srcnode, segments }.encode())
        .collect()
}

/// Phase III routing message covering nodes 1..=min(maxnodes, 255).
pub fn phase3_message(engine: &RoutingEngine, srcnode: NodeId) -> Vec<u8> {
    let vector = engine.advertised_l1();
    let last = (engine.limits().maxnodes.min(MAX_LEGACY_NODE) as usize).min(vector.len() - 1);
    Phase3Routing {
        srcnode: srcnode.without_area(),
        entries: vector[1..=last].to_vec(),
    }
    .encode()
}
