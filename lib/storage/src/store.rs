use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use spacefold_core::{ComparisonOperation, EntityId, NodeId, NodeValue, Result, Vector};
use std::collections::HashMap;

/// A k-nearest-neighbour request against stored index vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnSearch {
    /// Node whose stored vectors are searched
    pub index_node: NodeId,
    pub schema: String,
    /// Blob fields copied into each result
    pub returned_fields: Vec<String>,
    pub vector: Vector,
    pub limit: usize,
    /// Maximum cosine distance (`1 - score`)
    pub radius: Option<f32>,
    /// All must match the stored object
    pub filters: Vec<ComparisonOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub entity: EntityId,
    /// Source entity when the hit is a chunk
    pub origin: Option<EntityId>,
    pub score: f32,
    pub fields: HashMap<String, Value>,
}

/// Entity and node-result storage consumed by the evaluator and the query
/// engine.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn read_node_result(&self, entity: &EntityId, node_id: &NodeId) -> Result<Option<NodeValue>>;

    async fn read_node_results(&self, entities: &[EntityId], node_id: &NodeId) -> Result<Vec<Option<NodeValue>>> {
        let mut results = Vec::with_capacity(entities.len());
        for entity in entities {
            results.push(self.read_node_result(entity, node_id).await?);
        }
        Ok(results)
    }

    /// Store a node result. `origin` links a chunk to the entity it was cut from.
    async fn write_node_result(
        &self,
        entity: &EntityId,
        node_id: &NodeId,
        value: NodeValue,
        origin: Option<&EntityId>,
    ) -> Result<()>;

    /// Drop `node_id`'s results for the chunks of `origin` numbered `from` and
    /// up. Chunk ordinals are contiguous, so removal stops at the first gap.
    /// Returns how many chunk results were removed.
    async fn remove_chunk_results(&self, origin: &EntityId, node_id: &NodeId, from: usize) -> Result<usize>;

    /// Side-channel values kept next to a node result. Empty when none.
    async fn read_node_data(&self, entity: &EntityId, node_id: &NodeId) -> Result<HashMap<String, Value>>;

    async fn write_node_data(&self, entity: &EntityId, node_id: &NodeId, data: HashMap<String, Value>) -> Result<()>;

    async fn read_object_blob(&self, entity: &EntityId) -> Result<Option<Map<String, Value>>>;

    /// Merge `blob` into the stored object.
    async fn write_object_blob(&self, entity: &EntityId, blob: Map<String, Value>) -> Result<()>;

    async fn knn_search(&self, search: &KnnSearch) -> Result<Vec<SearchResult>>;
}
