//! Node variants and structural node identity.

use crate::effect::{IndexConfig, SchemaReference};
use serde::Serialize;
use sha2::{Digest, Sha256};
use spacefold_core::{ComparisonOperation, FieldType, NodeId, Result, Vector, Weighted};
use spacefold_schema::{ChunkingConfig, TransformationConfig};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Bumped whenever the hashed representation of a node changes.
pub const NODE_ID_VERSION: &str = "v1";

const NODE_ID_HEX_LEN: usize = 16;

/// Parameters of an event-aggregation node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventAggregationParams {
    pub space: String,
    pub event_schema: String,
    pub affected: SchemaReference,
    pub affecting: SchemaReference,
    /// `None` matches every event
    pub filters: Vec<Weighted<Option<ComparisonOperation>>>,
    pub transformation: Arc<TransformationConfig>,
    pub config: IndexConfig,
}

/// The closed set of node variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    SchemaField {
        schema: String,
        field: String,
        field_type: FieldType,
    },
    Chunking {
        schema: String,
        chunking: ChunkingConfig,
    },
    Embedding {
        space: String,
        schema: String,
        transformation: Arc<TransformationConfig>,
        /// Whether the input field may be absent
        nullable_input: bool,
    },
    Constant {
        schema: String,
        value: Vector,
    },
    Concatenation {
        schema: String,
        lengths: Vec<usize>,
    },
    Aggregation {
        schema: String,
        weights: Vec<f32>,
        transformation: Arc<TransformationConfig>,
    },
    EventAggregation(EventAggregationParams),
    Index {
        name: String,
        /// Root node per indexed schema
        schemas: BTreeMap<String, NodeId>,
    },
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::SchemaField { .. } => "schema_field",
            NodeKind::Chunking { .. } => "chunking",
            NodeKind::Embedding { .. } => "embedding",
            NodeKind::Constant { .. } => "constant",
            NodeKind::Concatenation { .. } => "concatenation",
            NodeKind::Aggregation { .. } => "aggregation",
            NodeKind::EventAggregation(_) => "event_aggregation",
            NodeKind::Index { .. } => "index",
        }
    }

    /// Schema whose entities this node produces values for.
    ///
    /// `None` for the index node, which serves every indexed schema.
    pub fn schema(&self) -> Option<&str> {
        match self {
            NodeKind::SchemaField { schema, .. }
            | NodeKind::Chunking { schema, .. }
            | NodeKind::Embedding { schema, .. }
            | NodeKind::Constant { schema, .. }
            | NodeKind::Concatenation { schema, .. }
            | NodeKind::Aggregation { schema, .. } => Some(schema),
            NodeKind::EventAggregation(params) => Some(&params.affected.schema),
            NodeKind::Index { .. } => None,
        }
    }
}

/// One node of an index graph.
///
/// The id is a hash of the variant, its configuration and the ordered parent
/// ids, so structurally identical nodes share an id.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    parents: Vec<Arc<Node>>,
    non_nullable: Vec<bool>,
}

impl Node {
    fn new(kind: NodeKind, parents: Vec<Arc<Node>>, non_nullable: Vec<bool>) -> Result<Arc<Node>> {
        let id = structural_id(&kind, &parents)?;
        Ok(Arc::new(Node {
            id,
            kind,
            parents,
            non_nullable,
        }))
    }

    pub fn schema_field(schema: &str, field: &str, field_type: FieldType) -> Result<Arc<Node>> {
        Self::new(
            NodeKind::SchemaField {
                schema: schema.to_string(),
                field: field.to_string(),
                field_type,
            },
            Vec::new(),
            Vec::new(),
        )
    }

    pub fn chunking(parent: Arc<Node>, chunking: ChunkingConfig) -> Result<Arc<Node>> {
        let schema = parent.schema().unwrap_or_default().to_string();
        Self::new(NodeKind::Chunking { schema, chunking }, vec![parent], vec![false])
    }

    pub fn embedding(
        space: &str,
        schema: &str,
        transformation: Arc<TransformationConfig>,
        parent: Arc<Node>,
        nullable_input: bool,
    ) -> Result<Arc<Node>> {
        Self::new(
            NodeKind::Embedding {
                space: space.to_string(),
                schema: schema.to_string(),
                transformation,
                nullable_input,
            },
            vec![parent],
            vec![!nullable_input],
        )
    }

    pub fn constant(schema: &str, value: Vector) -> Result<Arc<Node>> {
        Self::new(
            NodeKind::Constant {
                schema: schema.to_string(),
                value,
            },
            Vec::new(),
            Vec::new(),
        )
    }

    pub fn concatenation(schema: &str, parents: Vec<Arc<Node>>, lengths: Vec<usize>) -> Result<Arc<Node>> {
        let non_nullable = vec![true; parents.len()];
        Self::new(
            NodeKind::Concatenation {
                schema: schema.to_string(),
                lengths,
            },
            parents,
            non_nullable,
        )
    }

    /// The first parent is the base input and must produce a value; the rest
    /// are event aggregations that may have nothing yet.
    pub fn aggregation(
        schema: &str,
        parents: Vec<Weighted<Arc<Node>>>,
        transformation: Arc<TransformationConfig>,
    ) -> Result<Arc<Node>> {
        let weights = parents.iter().map(|p| p.weight).collect();
        let non_nullable = (0..parents.len()).map(|i| i == 0).collect();
        Self::new(
            NodeKind::Aggregation {
                schema: schema.to_string(),
                weights,
                transformation,
            },
            parents.into_iter().map(|p| p.item).collect(),
            non_nullable,
        )
    }

    /// `input_to_aggregate` computes the affecting entity's vector.
    pub fn event_aggregation(params: EventAggregationParams, input_to_aggregate: Arc<Node>) -> Result<Arc<Node>> {
        Self::new(NodeKind::EventAggregation(params), vec![input_to_aggregate], vec![true])
    }

    pub fn index(name: &str, schema_roots: &BTreeMap<String, Arc<Node>>) -> Result<Arc<Node>> {
        let schemas = schema_roots
            .iter()
            .map(|(schema, node)| (schema.clone(), node.id.clone()))
            .collect();
        let parents: Vec<Arc<Node>> = schema_roots.values().cloned().collect();
        let non_nullable = vec![true; parents.len()];
        Self::new(
            NodeKind::Index {
                name: name.to_string(),
                schemas,
            },
            parents,
            non_nullable,
        )
    }

    #[inline]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[inline]
    pub fn parents(&self) -> &[Arc<Node>] {
        &self.parents
    }

    pub fn is_non_nullable_parent(&self, index: usize) -> bool {
        self.non_nullable.get(index).copied().unwrap_or(false)
    }

    pub fn schema(&self) -> Option<&str> {
        self.kind.schema()
    }

    /// Whether results of this node are written to the store.
    pub fn is_persisted(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Embedding { .. } | NodeKind::EventAggregation(_) | NodeKind::Index { .. }
        )
    }

    /// Whether results of this node can carry chunks, i.e. a chunking node
    /// feeds it for the entity being evaluated.
    pub fn is_chunked(&self) -> bool {
        match self.kind {
            NodeKind::Chunking { .. } => true,
            NodeKind::EventAggregation(_) => false,
            _ => self.parents.iter().any(|p| p.is_chunked()),
        }
    }

    /// Output dimension of vector-valued nodes.
    pub fn length(&self) -> Option<usize> {
        match &self.kind {
            NodeKind::Embedding { transformation, .. } | NodeKind::Aggregation { transformation, .. } => {
                Some(transformation.length())
            }
            NodeKind::EventAggregation(params) => Some(params.transformation.length()),
            NodeKind::Constant { value, .. } => Some(value.dim()),
            NodeKind::Concatenation { lengths, .. } => Some(lengths.iter().sum()),
            NodeKind::Index { .. } => self.parents.first().and_then(|p| p.length()),
            NodeKind::SchemaField { .. } | NodeKind::Chunking { .. } => None,
        }
    }
}

fn structural_id(kind: &NodeKind, parents: &[Arc<Node>]) -> Result<NodeId> {
    let config = serde_json::to_string(kind)?;
    let parent_ids = parents.iter().map(|p| p.id.as_str()).collect::<Vec<_>>().join(",");
    let mut hasher = Sha256::new();
    hasher.update(NODE_ID_VERSION.as_bytes());
    hasher.update(b"|");
    hasher.update(kind.tag().as_bytes());
    hasher.update(b"|");
    hasher.update(config.as_bytes());
    hasher.update(b"|");
    hasher.update(parent_ids.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    Ok(NodeId::new(format!("{}-{}", kind.tag(), &hex[..NODE_ID_HEX_LEN])))
}
