//! Node database: address, name and verification values of known nodes.

use std::collections::HashMap;

use super::{validate_node_name, IdentityError, NodeId};

/// One known node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: NodeId,
    /// Upper case node name.
    pub name: String,
    /// Value this node must present when it connects to us.
    pub inbound_verification: Option<Vec<u8>>,
    /// Value we present when it asks us to verify.
    pub outbound_verification: Option<Vec<u8>>,
}

impl NodeRecord {
    pub fn new(id: NodeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_ascii_uppercase(),
            inbound_verification: None,
            outbound_verification: None,
        }
    }
}

/// Lookup tables built once at startup.
#[derive(Clone, Debug, Default)]
pub struct NodeDb {
    by_id: HashMap<NodeId, NodeRecord>,
    by_name: HashMap<String, NodeId>,
}

impl NodeDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Names and addresses must both be unique.
    pub fn insert(&mut self, record: NodeRecord) -> Result<(), IdentityError> {
        validate_node_name(&record.name)?;
        if self.by_id.contains_key(&record.id) {
            return Err(IdentityError::DuplicateNode(record.id.to_string()));
        }
        if self.by_name.contains_key(&record.name) {
            return Err(IdentityError::DuplicateNode(record.name.clone()));
        }
        self.by_name.insert(record.name.clone(), record.id);
        self.by_id.insert(record.id, record);
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.by_id.get(&id)
    }

    /// Address of the node called `name` (case insensitive).
    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(&name.to_ascii_uppercase()).copied()
    }

    pub fn name_of(&self, id: NodeId) -> Option<&str> {
        self.by_id.get(&id).map(|r| r.name.as_str())
    }

    /// Inbound verification value configured for `id`.
    pub fn inbound_verification(&self, id: NodeId) -> Option<&[u8]> {
        self.get(id).and_then(|r| r.inbound_verification.as_deref())
    }

    /// Outbound verification value for `id`; empty when none is configured.
    pub fn outbound_verification(&self, id: NodeId) -> &[u8] {
        self.get(id)
            .and_then(|r| r.outbound_verification.as_deref())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.by_id.values()
    }
}
