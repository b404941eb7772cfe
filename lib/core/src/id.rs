use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a stored record: the schema it belongs to and its object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub schema_id: String,
    pub object_id: String,
}

impl EntityId {
    pub fn new(schema_id: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            schema_id: schema_id.into(),
            object_id: object_id.into(),
        }
    }

    /// Id of the `ordinal`-th chunk derived from this entity.
    pub fn chunk(&self, ordinal: usize) -> EntityId {
        EntityId {
            schema_id: self.schema_id.clone(),
            object_id: format!("{}-{}", self.object_id, ordinal),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.schema_id, self.object_id)
    }
}

/// Structural identifier of a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}
