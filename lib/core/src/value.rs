use crate::field::FieldValue;
use crate::vector::Vector;
use serde::{Deserialize, Serialize};

/// Output of one node for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NodeValue {
    Field(FieldValue),
    Vector(Vector),
}

impl NodeValue {
    pub fn as_vector(&self) -> Option<&Vector> {
        match self {
            NodeValue::Vector(v) => Some(v),
            NodeValue::Field(_) => None,
        }
    }

    pub fn as_field(&self) -> Option<&FieldValue> {
        match self {
            NodeValue::Field(f) => Some(f),
            NodeValue::Vector(_) => None,
        }
    }

    pub fn into_vector(self) -> Option<Vector> {
        match self {
            NodeValue::Vector(v) => Some(v),
            NodeValue::Field(_) => None,
        }
    }
}

impl From<Vector> for NodeValue {
    fn from(v: Vector) -> Self {
        NodeValue::Vector(v)
    }
}

impl From<FieldValue> for NodeValue {
    fn from(f: FieldValue) -> Self {
        NodeValue::Field(f)
    }
}
