//! Query description and query vector construction.

use serde_json::Value;
use spacefold_core::{ComparisonOperation, EntityId, Error, FieldValue, NodeValue, Result, Vector, Weighted};
use spacefold_dag::Index;
use spacefold_schema::ExecutionContext;
use spacefold_storage::EntityStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An ad hoc input embedded through one space.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarClause {
    pub space: String,
    pub value: FieldValue,
    pub weight: f32,
}

/// A search against one schema of an index.
///
/// ```rust
/// use spacefold_engine::Query;
/// use spacefold_core::{ComparisonOperation, FieldValue};
///
/// let query = Query::new("paragraph")
///     .similar("text", FieldValue::String("cheap flights".to_string()))
///     .space_weight("text", 2.0)
///     .filter(ComparisonOperation::greater_than("likes", 10))
///     .limit(5);
/// assert_eq!(query.schema(), "paragraph");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    schema: String,
    similar: Vec<SimilarClause>,
    looks_like: Option<Weighted<EntityId>>,
    space_weights: Vec<(String, Value)>,
    filters: Vec<ComparisonOperation>,
    limit: Option<usize>,
    radius: Option<f32>,
    returned_fields: Vec<String>,
}

impl Query {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            similar: Vec::new(),
            looks_like: None,
            space_weights: Vec::new(),
            filters: Vec::new(),
            limit: None,
            radius: None,
            returned_fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn similar(self, space: impl Into<String>, value: FieldValue) -> Self {
        self.similar_weighted(space, value, 1.0)
    }

    #[must_use]
    pub fn similar_weighted(mut self, space: impl Into<String>, value: FieldValue, weight: f32) -> Self {
        self.similar.push(SimilarClause {
            space: space.into(),
            value,
            weight,
        });
        self
    }

    /// Search around a stored object's own index vector.
    #[must_use]
    pub fn looks_like(self, object_id: impl Into<String>) -> Self {
        let entity = EntityId::new(self.schema.clone(), object_id);
        self.looks_like_entity(entity, 1.0)
    }

    /// Search around the index vector of any entity of the index, such as a
    /// user whose vector was shaped by events.
    #[must_use]
    pub fn looks_like_entity(mut self, entity: EntityId, weight: f32) -> Self {
        self.looks_like = Some(Weighted::new(entity, weight));
        self
    }

    /// Weight of a space's part in the query vector. Must be numeric.
    #[must_use]
    pub fn space_weight(mut self, space: impl Into<String>, weight: impl Into<Value>) -> Self {
        self.space_weights.push((space.into(), weight.into()));
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: ComparisonOperation) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Maximum cosine distance of returned results.
    #[must_use]
    pub fn radius(mut self, radius: f32) -> Self {
        self.radius = Some(radius);
        self
    }

    /// Stored fields copied into every result.
    #[must_use]
    pub fn select(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.returned_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn filters(&self) -> &[ComparisonOperation] {
        &self.filters
    }

    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default)
    }

    pub fn radius_value(&self) -> Option<f32> {
        self.radius
    }

    pub fn returned_fields(&self) -> &[String] {
        &self.returned_fields
    }
}

/// Builds query vectors for one index.
pub struct QueryVectorFactory<'a> {
    index: &'a Index,
    store: &'a Arc<dyn EntityStore>,
}

impl<'a> QueryVectorFactory<'a> {
    pub fn new(index: &'a Index, store: &'a Arc<dyn EntityStore>) -> Self {
        Self { index, store }
    }

    /// The vector handed to the k-NN search for `query`.
    ///
    /// Stored index vectors are split into per-space parts and denormalized,
    /// ad hoc inputs are added to their space's part, and the parts are
    /// concatenated again with the query's space weights. With every weight
    /// at 1 a looks-like query reproduces the stored vector.
    pub async fn build(&self, query: &Query, context: &ExecutionContext) -> Result<Vector> {
        if !self.index.is_indexed(query.schema()) {
            return Err(Error::QueryBinding(format!(
                "schema '{}' is not indexed by '{}'",
                query.schema(),
                self.index.name()
            )));
        }
        let weights = self.space_weights(query)?;
        let lengths = self.index.space_lengths();
        let mut parts = vec![Vector::empty(); lengths.len()];

        if let Some(looks_like) = &query.looks_like {
            let stored = self.stored_vector(&looks_like.item).await? * looks_like.weight;
            if self.index.is_concatenated() {
                for (part, stored) in parts.iter_mut().zip(stored.split(&lengths)?) {
                    *part = stored.denormalize();
                }
            } else {
                parts[0] = stored;
            }
        }

        let context = context.to_query();
        let mut bound = HashSet::new();
        for clause in &query.similar {
            if !bound.insert(clause.space.as_str()) {
                return Err(Error::QueryBinding(format!("space '{}' bound twice", clause.space)));
            }
            let position = self.space_position(&clause.space)?;
            let transformation = self.index.spaces()[position].build_transformation()?;
            let vector = transformation.embed(&clause.value, &context).await? * clause.weight;
            parts[position] = parts[position].aggregate(&vector)?;
        }

        let vector = if self.index.is_concatenated() {
            Vector::concatenate_with_compensation(&parts, &lengths, &weights)?
        } else {
            match parts.pop() {
                Some(part) if !part.is_empty() => part * weights[0],
                _ => Vector::zeros(self.index.length()),
            }
        };
        tracing::debug!(
            index = %self.index.name(),
            schema = %query.schema(),
            n_similar = query.similar.len(),
            looks_like = query.looks_like.is_some(),
            "built query vector"
        );
        Ok(vector)
    }

    async fn stored_vector(&self, entity: &EntityId) -> Result<Vector> {
        self.store
            .read_node_result(entity, self.index.node().id())
            .await?
            .and_then(NodeValue::into_vector)
            .ok_or_else(|| Error::NotFound(format!("no index vector stored for {}", entity)))
    }

    fn space_position(&self, space: &str) -> Result<usize> {
        self.index
            .spaces()
            .iter()
            .position(|s| s.id == space)
            .ok_or_else(|| Error::QueryBinding(format!("space '{}' is not part of '{}'", space, self.index.name())))
    }

    /// One weight per index space, 1 unless set.
    fn space_weights(&self, query: &Query) -> Result<Vec<f32>> {
        let mut weights: HashMap<usize, f32> = HashMap::new();
        for (space, value) in &query.space_weights {
            let position = self.space_position(space)?;
            let weight = value
                .as_f64()
                .ok_or_else(|| Error::QueryBinding(format!("weight of space '{}' is not a number: {}", space, value)))?;
            if weights.insert(position, weight as f32).is_some() {
                return Err(Error::QueryBinding(format!("space '{}' weighted twice", space)));
            }
        }
        Ok((0..self.index.spaces().len())
            .map(|i| weights.get(&i).copied().unwrap_or(1.0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::evaluator::OnlineEvaluator;
    use spacefold_core::FieldType;
    use spacefold_schema::{EmbeddingRegistry, EntityUpdate, Record, Schema, Space};
    use spacefold_storage::InMemoryStore;

    fn context() -> ExecutionContext {
        ExecutionContext::online(Arc::new(EmbeddingRegistry::new()))
    }

    fn index() -> Index {
        Index::builder("idx")
            .space(Space::custom("a", 4).bind("doc", "a"))
            .space(Space::custom("b", 6).bind("doc", "b"))
            .schema(
                Schema::entity("doc")
                    .field("a", FieldType::FloatList)
                    .field("b", FieldType::FloatList),
            )
            .build()
            .unwrap()
    }

    async fn ingested() -> (Arc<dyn EntityStore>, Index, Vector) {
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new());
        let index = index();
        let evaluator = OnlineEvaluator::new(Arc::clone(&store), EngineConfig::default());
        let record = Record::new("doc", "1")
            .with_field("a", FieldValue::FloatList(vec![1.0, 2.0, 0.0, 2.0]))
            .with_field("b", FieldValue::FloatList(vec![0.0, 3.0, 0.0, 4.0, 0.0, 0.0]));
        let results = evaluator
            .evaluate(index.node(), &[EntityUpdate::from_record(&record)], &context())
            .await
            .unwrap();
        let stored = results[0].as_ref().unwrap().main_vector().unwrap().clone();
        (store, index, stored)
    }

    #[tokio::test]
    async fn test_looks_like_with_unit_weights_is_idempotent() {
        let (store, index, stored) = ingested().await;
        let factory = QueryVectorFactory::new(&index, &store);
        let query = Query::new("doc").looks_like("1").space_weight("a", 1.0).space_weight("b", 1.0);

        let vector = factory.build(&query, &context()).await.unwrap();
        assert_eq!(vector.dim(), 10);
        for (x, y) in vector.as_slice().iter().zip(stored.as_slice()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn test_zero_weight_removes_space() {
        let (store, index, _) = ingested().await;
        let factory = QueryVectorFactory::new(&index, &store);
        let query = Query::new("doc").looks_like("1").space_weight("b", 0.0);

        let vector = factory.build(&query, &context()).await.unwrap();
        assert!(vector.as_slice()[4..].iter().all(|x| *x == 0.0));
        assert!(vector.as_slice()[..4].iter().any(|x| *x != 0.0));
    }

    #[tokio::test]
    async fn test_similar_is_embedded_into_its_part() {
        let (store, index, _) = ingested().await;
        let factory = QueryVectorFactory::new(&index, &store);
        let query = Query::new("doc").similar("a", FieldValue::FloatList(vec![0.0, 0.0, 3.0, 4.0]));

        let vector = factory.build(&query, &context()).await.unwrap();
        assert_eq!(vector.dim(), 10);
        assert!(vector.as_slice()[4..].iter().all(|x| *x == 0.0));
        assert!(vector.as_slice()[2] > 0.0);
    }

    #[tokio::test]
    async fn test_binding_errors() {
        let (store, index, _) = ingested().await;
        let factory = QueryVectorFactory::new(&index, &store);
        let empty = FieldValue::FloatList(vec![0.0; 4]);

        let twice = Query::new("doc").similar("a", empty.clone()).similar("a", empty.clone());
        let unknown = Query::new("doc").similar("c", empty);
        let bad_weight = Query::new("doc").space_weight("a", "heavy");
        for query in [twice, unknown, bad_weight] {
            assert!(matches!(
                factory.build(&query, &context()).await,
                Err(Error::QueryBinding(_))
            ));
        }

        let missing = Query::new("doc").looks_like("nope");
        assert!(matches!(factory.build(&missing, &context()).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_query_is_zero_vector() {
        let (store, index, _) = ingested().await;
        let factory = QueryVectorFactory::new(&index, &store);
        let vector = factory.build(&Query::new("doc"), &context()).await.unwrap();
        assert_eq!(vector, Vector::zeros(10));
    }
}
