//! Online evaluation of an index graph for a batch of entity updates.
//!
//! The nodes a batch needs are grouped into levels by [`EvaluationPlan`].
//! Every node of a level is evaluated for the whole batch concurrently, and
//! a level starts only when the previous one has finished. Parent results
//! live in a table keyed by node id that is dropped when the call returns;
//! the store is the only durable cache.

use crate::config::EngineConfig;
use crate::event;
use crate::result::EvaluationResult;
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use spacefold_core::{EntityId, Error, FieldType, FieldValue, NodeId, NodeValue, Result, Vector, Weighted};
use spacefold_dag::{EvaluationPlan, Node, NodeKind, PlannedNode};
use spacefold_schema::{chunk_text, ChunkingConfig, EntityUpdate, ExecutionContext, TransformationConfig};
use spacefold_storage::EntityStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::Instrument;

pub(crate) type NodeResults = Vec<Option<EvaluationResult>>;

/// One evaluation row: an entity of the batch, or one of its chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RowKey {
    entity: usize,
    chunk: Option<usize>,
}

pub struct OnlineEvaluator {
    store: Arc<dyn EntityStore>,
    config: EngineConfig,
}

impl OnlineEvaluator {
    pub fn new(store: Arc<dyn EntityStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Evaluate `target` for every update, in input order.
    ///
    /// Updates may mix schemas; each schema gets its own plan.
    pub fn evaluate<'a>(
        &'a self,
        target: &'a Arc<Node>,
        updates: &'a [EntityUpdate],
        context: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeResults>> {
        let span = tracing::debug_span!("evaluate", node_id = %target.id(), n_entities = updates.len());
        async move {
            let mut by_schema: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
            for (i, update) in updates.iter().enumerate() {
                by_schema.entry(update.entity.schema_id.as_str()).or_default().push(i);
            }

            let mut output: NodeResults = vec![None; updates.len()];
            for (schema, positions) in by_schema {
                check_schema(target, schema)?;
                let plan = EvaluationPlan::new(target, schema)?;
                let group: Vec<EntityUpdate> = positions.iter().map(|&i| updates[i].clone()).collect();
                let mut results = self.run_plan(&plan, &group, context).await?;
                let target_results = results
                    .remove(target.id())
                    .unwrap_or_else(|| vec![None; group.len()]);
                for (position, result) in positions.into_iter().zip(target_results) {
                    output[position] = result;
                }
            }
            Ok(output)
        }
        .instrument(span)
        .boxed()
    }

    async fn run_plan(
        &self,
        plan: &EvaluationPlan,
        updates: &[EntityUpdate],
        context: &ExecutionContext,
    ) -> Result<HashMap<NodeId, NodeResults>> {
        let mut results: HashMap<NodeId, NodeResults> = HashMap::with_capacity(plan.len());
        for level in plan.levels() {
            let outputs = try_join_all(
                level
                    .iter()
                    .map(|planned| self.evaluate_node(planned, updates, &results, context)),
            )
            .await?;
            for (planned, output) in level.iter().zip(outputs) {
                results.insert(planned.node.id().clone(), output);
            }
        }
        Ok(results)
    }

    async fn evaluate_node(
        &self,
        planned: &PlannedNode,
        updates: &[EntityUpdate],
        results: &HashMap<NodeId, NodeResults>,
        context: &ExecutionContext,
    ) -> Result<NodeResults> {
        let node = &planned.node;
        let parents = planned
            .parents
            .iter()
            .map(|&i| {
                let parent = &node.parents()[i];
                results
                    .get(parent.id())
                    .ok_or_else(|| Error::NotFound(format!("parent {} of {} was not evaluated", parent.id(), node.id())))
            })
            .collect::<Result<Vec<&NodeResults>>>()?;

        for (row, update) in updates.iter().enumerate() {
            for (k, &i) in planned.parents.iter().enumerate() {
                if node.is_non_nullable_parent(i) && parents[k][row].is_none() {
                    return Err(Error::MissingRequiredParent {
                        node_id: node.id().to_string(),
                        entity: update.entity.to_string(),
                    });
                }
            }
        }

        let produced = match node.kind() {
            NodeKind::SchemaField { field, field_type, .. } => {
                self.read_field(node, field, *field_type, updates).await?
            }
            NodeKind::Chunking { chunking, .. } => chunk_parent(parents[0], chunking),
            NodeKind::Constant { value, .. } => vec![Some(EvaluationResult::new(value.clone())); updates.len()],
            NodeKind::EventAggregation(params) => {
                event::evaluate_event_aggregation(self, node, params, updates, context).await?
            }
            NodeKind::Embedding { .. }
            | NodeKind::Concatenation { .. }
            | NodeKind::Aggregation { .. }
            | NodeKind::Index { .. } => self.evaluate_rows(node, &parents, updates, context).await?,
        };

        let mut output = Vec::with_capacity(updates.len());
        let mut missing = Vec::new();
        for (row, (update, value)) in updates.iter().zip(produced).enumerate() {
            if let Some(result) = &value {
                if node.is_persisted() {
                    self.persist(node, &update.entity, result).await?;
                }
            } else {
                missing.push(row);
            }
            output.push(value);
        }
        if !missing.is_empty() {
            self.fall_back(node, updates, &missing, &mut output).await?;
        }
        Ok(output)
    }

    /// Fill rows the node's own logic left empty from the store.
    async fn fall_back(
        &self,
        node: &Arc<Node>,
        updates: &[EntityUpdate],
        rows: &[usize],
        output: &mut NodeResults,
    ) -> Result<()> {
        if matches!(
            node.kind(),
            NodeKind::SchemaField { .. } | NodeKind::Chunking { .. } | NodeKind::Constant { .. }
        ) {
            return Ok(());
        }
        let entities: Vec<EntityId> = rows.iter().map(|&row| updates[row].entity.clone()).collect();
        let stored = self.store.read_node_results(&entities, node.id()).await?;
        for ((&row, entity), value) in rows.iter().zip(&entities).zip(stored) {
            output[row] = match (value, node.kind()) {
                (Some(value), _) => Some(EvaluationResult::new(value)),
                (None, NodeKind::EventAggregation(_)) => None,
                (None, NodeKind::Embedding { transformation, .. }) => {
                    Some(EvaluationResult::new(default_vector(transformation)?))
                }
                (None, _) => {
                    return Err(Error::StaleOrMissingStoredResult {
                        node_id: node.id().to_string(),
                        schema: entity.schema_id.clone(),
                        object_id: entity.object_id.clone(),
                    })
                }
            };
        }
        tracing::debug!(node_id = %node.id(), n_entities = rows.len(), "used stored results");
        Ok(())
    }

    async fn persist(&self, node: &Node, entity: &EntityId, result: &EvaluationResult) -> Result<()> {
        self.store
            .write_node_result(entity, node.id(), result.main.clone(), None)
            .await?;
        for (ordinal, chunk) in result.chunks.iter().enumerate() {
            self.store
                .write_node_result(&entity.chunk(ordinal), node.id(), chunk.clone(), Some(entity))
                .await?;
        }
        if node.is_chunked() {
            let removed = self
                .store
                .remove_chunk_results(entity, node.id(), result.chunks.len())
                .await?;
            if removed > 0 {
                tracing::debug!(node_id = %node.id(), entity = %entity, removed, "removed stale chunks");
            }
        }
        Ok(())
    }

    /// The updated value, else the value in the stored object.
    async fn read_field(
        &self,
        node: &Node,
        field: &str,
        field_type: FieldType,
        updates: &[EntityUpdate],
    ) -> Result<NodeResults> {
        let mut output = Vec::with_capacity(updates.len());
        for update in updates {
            let value = match update.fields.get(field) {
                Some(value) => Some(value.clone()),
                None => match self.store.read_object_blob(&update.entity).await? {
                    Some(blob) => match blob.get(field).filter(|v| !v.is_null()) {
                        Some(json) => Some(
                            FieldValue::from_json(field_type, json).map_err(|e| wrap(node, &update.entity.to_string(), e))?,
                        ),
                        None => None,
                    },
                    None => None,
                },
            };
            output.push(value.map(EvaluationResult::new));
        }
        Ok(output)
    }

    /// Evaluate vector nodes row by row, where chunks of a parent become
    /// extra rows keyed by (entity, ordinal) and are regrouped afterwards.
    async fn evaluate_rows(
        &self,
        node: &Node,
        parents: &[&NodeResults],
        updates: &[EntityUpdate],
        context: &ExecutionContext,
    ) -> Result<NodeResults> {
        let mut keys = Vec::with_capacity(updates.len());
        for entity in 0..updates.len() {
            keys.push(RowKey { entity, chunk: None });
            let n_chunks = parents
                .iter()
                .filter_map(|p| p[entity].as_ref())
                .map(|r| r.chunks.len())
                .max()
                .unwrap_or(0);
            keys.extend((0..n_chunks).map(|k| RowKey {
                entity,
                chunk: Some(k),
            }));
        }
        let inputs: Vec<Vec<Option<&NodeValue>>> = keys
            .iter()
            .map(|key| {
                parents
                    .iter()
                    .map(|p| p[key.entity].as_ref().map(|r| r.value_for(key.chunk)))
                    .collect()
            })
            .collect();
        let label = |key: &RowKey| match key.chunk {
            Some(k) => updates[key.entity].entity.chunk(k).to_string(),
            None => updates[key.entity].entity.to_string(),
        };

        let values: Vec<Option<Vector>> = match node.kind() {
            NodeKind::Embedding { transformation, .. } => {
                self.embed_rows(node, transformation, &keys, &inputs, &label, context).await?
            }
            NodeKind::Concatenation { lengths, .. } => {
                let weights = vec![1.0; lengths.len()];
                let mut values = Vec::with_capacity(keys.len());
                for (key, row) in keys.iter().zip(&inputs) {
                    let parts: Vec<Vector> = row
                        .iter()
                        .map(|v| v.and_then(NodeValue::as_vector).cloned().unwrap_or_else(Vector::empty))
                        .collect();
                    let vector = Vector::concatenate_with_compensation(&parts, lengths, &weights)
                        .map_err(|e| wrap(node, &label(key), e))?;
                    values.push(Some(vector));
                }
                values
            }
            NodeKind::Aggregation {
                weights, transformation, ..
            } => {
                let transformation = transformation.build()?;
                let mut values = Vec::with_capacity(keys.len());
                for (key, row) in keys.iter().zip(&inputs) {
                    let items: Vec<Weighted<Vector>> = row
                        .iter()
                        .zip(weights)
                        .filter_map(|(v, &w)| v.and_then(NodeValue::as_vector).map(|v| Weighted::new(v.clone(), w)))
                        .collect();
                    let vector = transformation
                        .aggregate(&items, context)
                        .await
                        .map_err(|e| wrap(node, &label(key), e))?;
                    values.push(Some(if vector.is_empty() {
                        Vector::zeros(transformation.length())
                    } else {
                        vector
                    }));
                }
                values
            }
            NodeKind::Index { .. } => inputs
                .iter()
                .map(|row| row.first().copied().flatten().and_then(NodeValue::as_vector).cloned())
                .collect(),
            other => {
                return Err(Error::InvalidInput(format!("{} nodes are not evaluated row by row", other.tag())));
            }
        };

        let mut mains: Vec<Option<NodeValue>> = vec![None; updates.len()];
        let mut chunks: Vec<BTreeMap<usize, NodeValue>> = vec![BTreeMap::new(); updates.len()];
        for (key, value) in keys.iter().zip(values) {
            let Some(value) = value else { continue };
            match key.chunk {
                None => mains[key.entity] = Some(NodeValue::Vector(value)),
                Some(ordinal) => {
                    chunks[key.entity].insert(ordinal, NodeValue::Vector(value));
                }
            }
        }
        Ok(mains
            .into_iter()
            .zip(chunks)
            .map(|(main, chunks)| main.map(|m| EvaluationResult::new(m).with_chunks(chunks.into_values().collect())))
            .collect())
    }

    /// Main rows are embedded in one call, chunk rows in batches of
    /// `chunk_batch_size`.
    async fn embed_rows(
        &self,
        node: &Node,
        transformation: &Arc<TransformationConfig>,
        keys: &[RowKey],
        inputs: &[Vec<Option<&NodeValue>>],
        label: &(dyn Fn(&RowKey) -> String + Sync),
        context: &ExecutionContext,
    ) -> Result<Vec<Option<Vector>>> {
        let transformation = transformation.build()?;
        let (main_rows, chunk_rows): (Vec<usize>, Vec<usize>) = (0..keys.len())
            .filter(|&row| inputs[row].first().copied().flatten().is_some())
            .partition(|&row| keys[row].chunk.is_none());
        if !chunk_rows.is_empty() {
            tracing::debug!(
                node_id = %node.id(),
                n_chunks = chunk_rows.len(),
                batch_size = self.config.chunk_batch_size,
                "embedding chunks"
            );
        }

        let mut values = vec![None; keys.len()];
        let batches = std::iter::once(main_rows.as_slice()).chain(chunk_rows.chunks(self.config.chunk_batch_size.max(1)));
        for batch in batches.filter(|b| !b.is_empty()) {
            let fields = batch
                .iter()
                .map(|&row| {
                    inputs[row]
                        .first()
                        .copied()
                        .flatten()
                        .and_then(NodeValue::as_field)
                        .cloned()
                        .ok_or_else(|| wrap(node, &label(&keys[row]), Error::InvalidInput("expected a field value".to_string())))
                })
                .collect::<Result<Vec<FieldValue>>>()?;
            let vectors = match transformation.embed_batch(&fields, context).await {
                Ok(vectors) => vectors,
                Err(error) if error.is_structural() => return Err(error),
                Err(error) => {
                    // retry row by row to blame the row that fails
                    for (&row, field) in batch.iter().zip(&fields) {
                        if let Err(row_error) = transformation.embed(field, context).await {
                            return Err(wrap(node, &label(&keys[row]), row_error));
                        }
                    }
                    let labels: Vec<String> = batch.iter().map(|&row| label(&keys[row])).collect();
                    return Err(wrap(node, &labels.join(", "), error));
                }
            };
            for (&row, vector) in batch.iter().zip(vectors) {
                values[row] = Some(vector);
            }
        }
        Ok(values)
    }
}

fn check_schema(target: &Node, schema: &str) -> Result<()> {
    match target.kind() {
        NodeKind::Index { name, schemas } if !schemas.contains_key(schema) => Err(Error::InvalidInput(format!(
            "schema '{}' is not indexed by '{}'",
            schema, name
        ))),
        _ => match target.schema() {
            Some(own) if own != schema => Err(Error::InvalidInput(format!(
                "node {} evaluates '{}', got entities of '{}'",
                target.id(),
                own,
                schema
            ))),
            _ => Ok(()),
        },
    }
}

fn chunk_parent(parent: &NodeResults, chunking: &ChunkingConfig) -> NodeResults {
    parent
        .iter()
        .map(|result| {
            let result = result.as_ref()?;
            let text = result.main.as_field()?.as_str()?;
            let chunks = chunk_text(text, chunking)
                .into_iter()
                .map(|chunk| NodeValue::Field(FieldValue::String(chunk)))
                .collect();
            Some(EvaluationResult::new(result.main.clone()).with_chunks(chunks))
        })
        .collect()
}

fn default_vector(transformation: &Arc<TransformationConfig>) -> Result<Vector> {
    Ok(transformation.build()?.default_vector())
}

/// Tag an error with the node and entity it came from, unless it is a
/// configuration error that applies to the whole batch.
pub(crate) fn wrap(node: &Node, entity: &str, error: Error) -> Error {
    if error.is_structural() {
        return error;
    }
    Error::NodeEvaluation {
        node_id: node.id().to_string(),
        entity: entity.to_string(),
        source: Box::new(error),
    }
}
