//! Brute-force in-process [`EntityStore`].

use crate::store::{EntityStore, KnnSearch, SearchResult};
use async_trait::async_trait;
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use spacefold_core::{EntityId, Error, NodeId, NodeValue, Result};
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
struct StoredEntity {
    blob: Map<String, Value>,
    origin: Option<EntityId>,
    results: HashMap<NodeId, NodeValue>,
    data: HashMap<NodeId, HashMap<String, Value>>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    entities: RwLock<HashMap<EntityId, StoredEntity>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities, chunks included.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn read_node_result(&self, entity: &EntityId, node_id: &NodeId) -> Result<Option<NodeValue>> {
        Ok(self
            .entities
            .read()
            .get(entity)
            .and_then(|stored| stored.results.get(node_id))
            .cloned())
    }

    async fn read_node_results(&self, entities: &[EntityId], node_id: &NodeId) -> Result<Vec<Option<NodeValue>>> {
        let stored = self.entities.read();
        Ok(entities
            .iter()
            .map(|entity| stored.get(entity).and_then(|e| e.results.get(node_id)).cloned())
            .collect())
    }

    async fn write_node_result(
        &self,
        entity: &EntityId,
        node_id: &NodeId,
        value: NodeValue,
        origin: Option<&EntityId>,
    ) -> Result<()> {
        let mut entities = self.entities.write();
        let stored = entities.entry(entity.clone()).or_default();
        if let Some(origin) = origin {
            stored.origin = Some(origin.clone());
        }
        stored.results.insert(node_id.clone(), value);
        Ok(())
    }

    async fn remove_chunk_results(&self, origin: &EntityId, node_id: &NodeId, from: usize) -> Result<usize> {
        let mut entities = self.entities.write();
        let mut removed = 0;
        for ordinal in from.. {
            let chunk = origin.chunk(ordinal);
            let Some(stored) = entities.get_mut(&chunk) else { break };
            if stored.results.remove(node_id).is_none() {
                break;
            }
            removed += 1;
            if stored.results.is_empty() && stored.data.is_empty() && stored.blob.is_empty() {
                entities.remove(&chunk);
            }
        }
        Ok(removed)
    }

    async fn read_node_data(&self, entity: &EntityId, node_id: &NodeId) -> Result<HashMap<String, Value>> {
        Ok(self
            .entities
            .read()
            .get(entity)
            .and_then(|stored| stored.data.get(node_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn write_node_data(&self, entity: &EntityId, node_id: &NodeId, data: HashMap<String, Value>) -> Result<()> {
        self.entities
            .write()
            .entry(entity.clone())
            .or_default()
            .data
            .entry(node_id.clone())
            .or_default()
            .extend(data);
        Ok(())
    }

    async fn read_object_blob(&self, entity: &EntityId) -> Result<Option<Map<String, Value>>> {
        Ok(self
            .entities
            .read()
            .get(entity)
            .filter(|stored| !stored.blob.is_empty())
            .map(|stored| stored.blob.clone()))
    }

    async fn write_object_blob(&self, entity: &EntityId, blob: Map<String, Value>) -> Result<()> {
        self.entities.write().entry(entity.clone()).or_default().blob.extend(blob);
        Ok(())
    }

    async fn knn_search(&self, search: &KnnSearch) -> Result<Vec<SearchResult>> {
        if search.limit == 0 {
            return Err(Error::InvalidInput("search limit must be positive".to_string()));
        }
        let entities = self.entities.read();
        let mut results: Vec<SearchResult> = entities
            .iter()
            .filter(|(entity, _)| entity.schema_id == search.schema)
            .filter_map(|(entity, stored)| {
                let vector = stored.results.get(&search.index_node)?.as_vector()?;
                if vector.dim() != search.vector.dim() {
                    tracing::warn!(
                        entity = %entity,
                        expected = search.vector.dim(),
                        actual = vector.dim(),
                        "skipping stored vector with mismatching dimension"
                    );
                    return None;
                }
                // chunks are filtered and reported through their origin
                let object = match &stored.origin {
                    Some(origin) => entities.get(origin).map(|o| &o.blob).unwrap_or(&stored.blob),
                    None => &stored.blob,
                };
                if !search.filters.iter().all(|f| f.evaluate_json(object)) {
                    return None;
                }
                let score = vector.cosine_similarity(&search.vector);
                if matches!(search.radius, Some(radius) if 1.0 - score > radius) {
                    return None;
                }
                let fields = search
                    .returned_fields
                    .iter()
                    .filter_map(|name| object.get(name).map(|v| (name.clone(), v.clone())))
                    .collect();
                Some(SearchResult {
                    entity: entity.clone(),
                    origin: stored.origin.clone(),
                    score,
                    fields,
                })
            })
            .collect();

        results.sort_by_key(|r| (Reverse(OrderedFloat(r.score)), r.entity.clone()));
        results.truncate(search.limit);
        tracing::debug!(schema = %search.schema, n_results = results.len(), "knn search");
        Ok(results)
    }
}
