//! Folding events into a running per-entity aggregate.
//!
//! The stored aggregate and [`EventMetadata`] are the only state kept per
//! affected entity. A new event is blended into them without reading any
//! earlier event.

use crate::evaluator::{wrap, NodeResults, OnlineEvaluator};
use crate::result::EvaluationResult;
use serde_json::Value;
use spacefold_core::{EntityId, NodeValue, Result, Vector, Weighted};
use spacefold_dag::{EventAggregationParams, Node};
use spacefold_schema::{EntityUpdate, ExecutionContext, Transformation};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const COUNT_KEY: &str = "effect_count";
const AVG_CREATED_AT_KEY: &str = "effect_avg_ts";
const OLDEST_CREATED_AT_KEY: &str = "effect_oldest_ts";

/// Running statistics of the events folded into one aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventMetadata {
    /// Matching filters summed over every folded event
    pub count: u64,
    pub avg_created_at: i64,
    pub oldest_created_at: i64,
}

impl EventMetadata {
    pub fn from_node_data(data: &HashMap<String, Value>) -> Self {
        let int = |key: &str| data.get(key).and_then(Value::as_i64).unwrap_or(0);
        Self {
            count: data.get(COUNT_KEY).and_then(Value::as_u64).unwrap_or(0),
            avg_created_at: int(AVG_CREATED_AT_KEY),
            oldest_created_at: int(OLDEST_CREATED_AT_KEY),
        }
    }

    pub fn to_node_data(&self) -> HashMap<String, Value> {
        HashMap::from([
            (COUNT_KEY.to_string(), Value::from(self.count)),
            (AVG_CREATED_AT_KEY.to_string(), Value::from(self.avg_created_at)),
            (OLDEST_CREATED_AT_KEY.to_string(), Value::from(self.oldest_created_at)),
        ])
    }

    /// Statistics after an event at `created_at` matched `n_matches` filters.
    ///
    /// The average is a count-weighted rolling mean rounded up to whole seconds.
    #[must_use]
    pub fn recalculate(&self, created_at: i64, n_matches: u64) -> Self {
        let count = self.count + n_matches;
        let avg_created_at = if count == 0 || (n_matches == 0 && self.avg_created_at != 0) {
            self.avg_created_at
        } else {
            let total = self.avg_created_at as f64 * self.count as f64 + created_at as f64 * n_matches as f64;
            (total / count as f64).ceil() as i64
        };
        let oldest_created_at = if self.oldest_created_at == 0 {
            created_at
        } else {
            self.oldest_created_at.min(created_at)
        };
        Self {
            count,
            avg_created_at,
            oldest_created_at,
        }
    }
}

/// Weight multiplier of the stored aggregate given how old its events are.
///
/// Falls linearly from 1 to `floor` as the average event age approaches
/// `max_age` (or the age of the oldest event when unset). Beyond it the
/// aggregate has no weight at all.
pub fn time_modifier(now: i64, oldest_created_at: i64, avg_created_at: i64, max_age: Option<i64>, floor: f32) -> f32 {
    let max = max_age.unwrap_or(now - oldest_created_at);
    if max == 0 {
        return 1.0;
    }
    let age = now - avg_created_at;
    if max < age {
        return 0.0;
    }
    (1.0 - age as f32 / max as f32) * (1.0 - floor) + floor
}

/// What one event row adds to its affected entity.
#[derive(Debug)]
struct Contribution {
    affecting: EntityId,
    weight: f32,
    n_matches: u64,
    created_at: i64,
}

fn contribution(
    params: &EventAggregationParams,
    update: &EntityUpdate,
    now: i64,
) -> Option<Contribution> {
    let event = update.event.as_ref()?;
    if event.schema != params.event_schema
        || update.entity.schema_id != params.affected.schema
        || event.reference(&params.affected.reference_field) != Some(update.entity.object_id.as_str())
    {
        return None;
    }
    let affecting = event.reference(&params.affecting.reference_field)?;

    let weights: Vec<f32> = params
        .filters
        .iter()
        .filter(|filter| filter.item.as_ref().map_or(true, |op| op.evaluate(&event.fields)))
        .map(|filter| filter.weight)
        .collect();
    if weights.is_empty() {
        return None;
    }
    if let Some(max_age) = params.config.max_age {
        if now - event.created_at > max_age {
            tracing::debug!(event_id = %event.id, created_at = event.created_at, "skipping event older than max_age");
            return None;
        }
    }
    Some(Contribution {
        affecting: EntityId::new(params.affecting.schema.clone(), affecting),
        weight: weights.iter().sum::<f32>() / weights.len() as f32,
        n_matches: weights.len() as u64,
        created_at: event.created_at,
    })
}

/// Evaluate an event-aggregation node for a batch of event-carrying updates.
///
/// Rows for the same entity are folded in input order and all of them report
/// the entity's final aggregate. Entities without a contributing event get
/// `None`.
pub(crate) async fn evaluate_event_aggregation(
    evaluator: &OnlineEvaluator,
    node: &Arc<Node>,
    params: &EventAggregationParams,
    updates: &[EntityUpdate],
    context: &ExecutionContext,
) -> Result<NodeResults> {
    let now = context.now();
    let contributions: Vec<Option<Contribution>> =
        updates.iter().map(|update| contribution(params, update, now)).collect();
    if contributions.iter().all(Option::is_none) {
        return Ok(vec![None; updates.len()]);
    }

    let affecting_vectors = affecting_vectors(evaluator, node, &contributions, context).await?;
    let transformation = params.transformation.build()?;

    let mut rows_by_entity: BTreeMap<&EntityId, Vec<usize>> = BTreeMap::new();
    for (row, update) in updates.iter().enumerate() {
        rows_by_entity.entry(&update.entity).or_default().push(row);
    }

    let store = evaluator.store();
    let mut output: NodeResults = vec![None; updates.len()];
    for (entity, rows) in rows_by_entity {
        if rows.iter().all(|&row| contributions[row].is_none()) {
            continue;
        }
        let mut aggregate = store
            .read_node_result(entity, node.id())
            .await?
            .and_then(NodeValue::into_vector)
            .filter(|v| !v.is_empty());
        let mut metadata = EventMetadata::from_node_data(&store.read_node_data(entity, node.id()).await?);
        let mut changed = false;

        for &row in &rows {
            let Some(contribution) = &contributions[row] else { continue };
            let Some(affecting) = affecting_vectors.get(&contribution.affecting).filter(|v| !v.is_empty()) else {
                continue;
            };
            metadata = metadata.recalculate(contribution.created_at, contribution.n_matches);
            aggregate = Some(
                fold(
                    &transformation,
                    params,
                    aggregate.take(),
                    Weighted::new(affecting.clone(), contribution.weight),
                    &metadata,
                    context,
                )
                .await
                .map_err(|e| wrap(node, &entity.to_string(), e))?,
            );
            changed = true;
        }

        if !changed {
            continue;
        }
        store.write_node_data(entity, node.id(), metadata.to_node_data()).await?;
        tracing::debug!(node_id = %node.id(), %entity, count = metadata.count, "folded events");
        if let Some(vector) = aggregate {
            for &row in &rows {
                output[row] = Some(EvaluationResult::new(vector.clone()));
            }
        }
    }
    Ok(output)
}

/// Blend one weighted affecting vector into the stored aggregate.
async fn fold(
    transformation: &Transformation,
    params: &EventAggregationParams,
    stored: Option<Vector>,
    affecting: Weighted<Vector>,
    metadata: &EventMetadata,
    context: &ExecutionContext,
) -> Result<Vector> {
    let contribution = transformation.aggregate_unnormalized(&[affecting], context).await?;
    let Some(stored) = stored else {
        return Ok(contribution);
    };

    let config = &params.config;
    let stored_weight = time_modifier(
        context.now(),
        metadata.oldest_created_at,
        metadata.avg_created_at,
        config.max_age,
        config.time_decay_floor,
    ) * metadata.count.saturating_sub(1) as f32
        * (1.0 - config.temperature);
    let total = config.temperature + stored_weight;
    if total == 0.0 {
        return Ok(stored);
    }
    transformation
        .aggregate_unnormalized(
            &[
                Weighted::new(contribution, config.temperature / total),
                Weighted::new(stored, stored_weight / total),
            ],
            context,
        )
        .await
}

/// Current vectors of the affecting entities: stored values first, the rest
/// evaluated through the node's input.
async fn affecting_vectors(
    evaluator: &OnlineEvaluator,
    node: &Arc<Node>,
    contributions: &[Option<Contribution>],
    context: &ExecutionContext,
) -> Result<HashMap<EntityId, Vector>> {
    let Some(input) = node.parents().first() else {
        return Ok(HashMap::new());
    };
    let mut entities: Vec<EntityId> = contributions
        .iter()
        .flatten()
        .map(|c| c.affecting.clone())
        .collect();
    entities.sort();
    entities.dedup();

    let stored = evaluator.store().read_node_results(&entities, input.id()).await?;
    let mut vectors = HashMap::with_capacity(entities.len());
    let mut missing = Vec::new();
    for (entity, value) in entities.into_iter().zip(stored) {
        match value.and_then(NodeValue::into_vector) {
            Some(vector) => {
                vectors.insert(entity, vector);
            }
            None => missing.push(EntityUpdate::new(entity)),
        }
    }
    if !missing.is_empty() {
        let evaluated = evaluator.evaluate(input, &missing, context).await?;
        for (update, result) in missing.into_iter().zip(evaluated) {
            if let Some(vector) = result.and_then(|r| r.main.into_vector()) {
                vectors.insert(update.entity, vector);
            }
        }
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use spacefold_core::{ComparisonOperation, FieldType, FieldValue};
    use spacefold_dag::{Effect, Index, IndexConfig, SchemaReference};
    use spacefold_schema::{EmbeddingRegistry, EventRecord, Record, Schema, Space};
    use spacefold_storage::{EntityStore, InMemoryStore};

    const NOW: i64 = 1_700_000_000;

    fn context() -> ExecutionContext {
        ExecutionContext::online(Arc::new(EmbeddingRegistry::new())).with_now(NOW)
    }

    fn index(config: IndexConfig) -> Index {
        let effect = Effect::new(
            "vec",
            "interaction",
            SchemaReference::new("user", "user"),
            SchemaReference::new("paragraph", "paragraph"),
        );
        Index::builder("idx")
            .space(Space::custom("vec", 2).bind("paragraph", "embedding"))
            .schema(Schema::entity("paragraph").field("embedding", FieldType::FloatList))
            .schema(Schema::entity("user"))
            .schema(
                Schema::event("interaction")
                    .reference("user", "user")
                    .reference("paragraph", "paragraph")
                    .field("type", FieldType::String),
            )
            .effect(effect.clone().with_filter(ComparisonOperation::equal("type", "like")).with_multiplier(2.0))
            .effect(effect)
            .config(config)
            .build()
            .unwrap()
    }

    async fn setup(config: IndexConfig) -> (Arc<InMemoryStore>, OnlineEvaluator, Index) {
        let store = Arc::new(InMemoryStore::new());
        let evaluator = OnlineEvaluator::new(store.clone(), EngineConfig::default());
        let index = index(config);
        let paragraphs = [("p1", vec![1.0, 0.0]), ("p2", vec![0.0, 1.0])]
            .into_iter()
            .map(|(id, v)| {
                EntityUpdate::from_record(&Record::new("paragraph", id).with_field("embedding", FieldValue::FloatList(v)))
            })
            .collect::<Vec<_>>();
        evaluator.evaluate(index.node(), &paragraphs, &context()).await.unwrap();
        (store, evaluator, index)
    }

    fn like(paragraph: &str, created_at: i64) -> EntityUpdate {
        let event = EventRecord::new("interaction", created_at)
            .with_reference("user", "u1")
            .with_reference("paragraph", paragraph)
            .with_field("type", FieldValue::String("like".to_string()));
        EntityUpdate::for_event(EntityId::new("user", "u1"), Arc::new(event))
    }

    #[test]
    fn test_metadata_recalculation() {
        let metadata = EventMetadata::default().recalculate(100, 2);
        assert_eq!(metadata.count, 2);
        assert_eq!(metadata.avg_created_at, 100);
        assert_eq!(metadata.oldest_created_at, 100);

        let metadata = metadata.recalculate(201, 1);
        assert_eq!(metadata.count, 3);
        assert_eq!(metadata.avg_created_at, 134);
        assert_eq!(metadata.oldest_created_at, 100);

        let restored = EventMetadata::from_node_data(&metadata.to_node_data());
        assert_eq!(restored, metadata);
    }

    #[test]
    fn test_time_modifier() {
        assert_eq!(time_modifier(100, 100, 100, None, 0.0), 1.0);
        assert!((time_modifier(100, 0, 50, None, 0.0) - 0.5).abs() < 1e-6);
        assert!((time_modifier(100, 0, 50, None, 0.5) - 0.75).abs() < 1e-6);
        assert_eq!(time_modifier(100, 0, 0, Some(10), 0.5), 0.0);
    }

    #[tokio::test]
    async fn test_first_event_is_weighted_affecting_vector() {
        let (store, evaluator, index) = setup(IndexConfig::default()).await;
        let node = index.event_nodes_for("interaction").remove(0);
        let user = EntityId::new("user", "u1");

        let results = evaluator.evaluate(&node, &[like("p1", NOW)], &context()).await.unwrap();
        let vector = results[0].as_ref().unwrap().main_vector().unwrap();
        // both filters match: weights 2 and 1 average to 1.5
        assert_eq!(vector.as_slice(), &[1.5, 0.0]);

        let metadata = EventMetadata::from_node_data(&store.read_node_data(&user, node.id()).await.unwrap());
        assert_eq!(metadata.count, 2);
        assert_eq!(metadata.oldest_created_at, NOW);
    }

    #[tokio::test]
    async fn test_second_event_blends_with_stored_aggregate() {
        let config = IndexConfig {
            temperature: 0.5,
            ..IndexConfig::default()
        };
        let (_store, evaluator, index) = setup(config).await;
        let node = index.event_nodes_for("interaction").remove(0);

        evaluator.evaluate(&node, &[like("p1", NOW)], &context()).await.unwrap();
        let results = evaluator.evaluate(&node, &[like("p2", NOW)], &context()).await.unwrap();
        let vector = results[0].as_ref().unwrap().main_vector().unwrap();
        // stored weight: 1 * (4 - 1) * 0.5 = 1.5 against temperature 0.5
        assert!((vector.as_slice()[0] - 1.125).abs() < 1e-5);
        assert!((vector.as_slice()[1] - 0.375).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_event_older_than_max_age_changes_nothing() {
        let config = IndexConfig {
            max_age: Some(3600),
            ..IndexConfig::default()
        };
        let (store, evaluator, index) = setup(config).await;
        let node = index.event_nodes_for("interaction").remove(0);
        let user = EntityId::new("user", "u1");

        let results = evaluator.evaluate(&node, &[like("p1", NOW - 7200)], &context()).await.unwrap();
        assert!(results[0].is_none());
        assert!(store.read_node_result(&user, node.id()).await.unwrap().is_none());
        assert!(store.read_node_data(&user, node.id()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_moves_affected_index_vector() {
        let (_store, evaluator, index) = setup(IndexConfig::default()).await;
        let results = evaluator.evaluate(index.node(), &[like("p2", NOW)], &context()).await.unwrap();
        let vector = results[0].as_ref().unwrap().main_vector().unwrap();
        assert!(vector.as_slice()[0].abs() < 1e-6);
        assert!((vector.as_slice()[1] - 1.0).abs() < 1e-6);
    }
}
