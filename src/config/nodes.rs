//! Node database entries (`nodes[]`).

use serde::{Deserialize, Serialize};

use crate::identity::{NodeDb, NodeId, NodeRecord};

use super::ConfigError;

/// A known remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeEntry {
    pub id: NodeId,
    pub name: String,

    /// Value the node must send when we require verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbound_verification: Option<String>,

    /// Value we send when the node asks us to verify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_verification: Option<String>,
}

impl NodeEntry {
    pub fn new(id: NodeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            inbound_verification: None,
            outbound_verification: None,
        }
    }

    fn record(&self) -> NodeRecord {
        let mut record = NodeRecord::new(self.id, &self.name);
        record.inbound_verification = self.inbound_verification.as_ref().map(|v| v.as_bytes().to_vec());
        record.outbound_verification =
            self.outbound_verification.as_ref().map(|v| v.as_bytes().to_vec());
        record
    }

    /// Check the verification values against `max` bytes.
    pub(super) fn check_verification(&self, max: usize) -> Result<(), ConfigError> {
        for value in [&self.inbound_verification, &self.outbound_verification]
            .into_iter()
            .flatten()
        {
            if value.len() > max {
                return Err(ConfigError::Invalid(format!(
                    "node {}: verification value longer than {} bytes",
                    self.name, max
                )));
            }
        }
        Ok(())
    }
}

/// Build the node database from config entries.
pub(super) fn build_node_db(entries: &[NodeEntry]) -> Result<NodeDb, ConfigError> {
    let mut db = NodeDb::new();
    for entry in entries {
        db.insert(entry.record())?;
    }
    Ok(db)
}
