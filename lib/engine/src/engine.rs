use crate::config::EngineConfig;
use crate::evaluator::OnlineEvaluator;
use crate::query::{Query, QueryVectorFactory};
use crate::result::EvaluationResult;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use spacefold_core::{EntityId, Error, Result};
use spacefold_dag::{Index, NodeKind};
use spacefold_schema::{EmbeddingRegistry, EntityUpdate, EventRecord, ExecutionContext, Record, CREATED_AT_FIELD};
use spacefold_storage::{EntityStore, KnnSearch, SearchResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;

/// Entry point tying indices, the store and the embedding registry together.
pub struct Engine {
    store: Arc<dyn EntityStore>,
    registry: Arc<EmbeddingRegistry>,
    config: EngineConfig,
    evaluator: OnlineEvaluator,
    indices: RwLock<HashMap<String, Arc<Index>>>,
}

impl Engine {
    pub fn new(store: Arc<dyn EntityStore>, registry: Arc<EmbeddingRegistry>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            evaluator: OnlineEvaluator::new(Arc::clone(&store), config.clone()),
            store,
            registry,
            config,
            indices: RwLock::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<EmbeddingRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn add_index(&self, index: Index) -> Result<Arc<Index>> {
        let mut indices = self.indices.write();
        if indices.contains_key(index.name()) {
            return Err(Error::InvalidConfig(format!("index '{}' already exists", index.name())));
        }
        let index = Arc::new(index);
        indices.insert(index.name().to_string(), Arc::clone(&index));
        tracing::info!(index = %index.name(), dim = index.length(), "added index");
        Ok(index)
    }

    pub fn index(&self, name: &str) -> Result<Arc<Index>> {
        self.indices
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("index '{}'", name)))
    }

    /// Ingestion context at the current time.
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::online(Arc::clone(&self.registry))
    }

    pub async fn ingest(&self, index: &str, records: &[Record]) -> Result<Vec<Option<EvaluationResult>>> {
        self.ingest_with_context(index, records, &self.context()).await
    }

    /// Store the records and recompute their index vectors.
    #[instrument(skip(self, records, context), fields(n_records = records.len()))]
    pub async fn ingest_with_context(
        &self,
        index: &str,
        records: &[Record],
        context: &ExecutionContext,
    ) -> Result<Vec<Option<EvaluationResult>>> {
        let index = self.index(index)?;
        let mut updates = Vec::with_capacity(records.len());
        for record in records {
            let schema = index
                .schema(&record.schema)
                .filter(|s| !s.is_event())
                .ok_or_else(|| Error::InvalidInput(format!("'{}' is not an entity schema of this index", record.schema)))?;
            let mut blob: Map<String, Value> = record
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect();
            blob.insert(schema.id_field.clone(), Value::String(record.id.clone()));
            self.store.write_object_blob(&record.entity_id(), blob).await?;
            if index.is_indexed(&record.schema) {
                updates.push(EntityUpdate::from_record(record));
            }
        }
        self.evaluator.evaluate(index.node(), &updates, context).await
    }

    pub async fn ingest_events(&self, index: &str, events: &[EventRecord]) -> Result<Vec<Option<EvaluationResult>>> {
        self.ingest_events_with_context(index, events, &self.context()).await
    }

    /// Store the events and fold them into every entity they affect.
    ///
    /// Returns one result per affected entity and event, in event order.
    #[instrument(skip(self, events, context), fields(n_events = events.len()))]
    pub async fn ingest_events_with_context(
        &self,
        index: &str,
        events: &[EventRecord],
        context: &ExecutionContext,
    ) -> Result<Vec<Option<EvaluationResult>>> {
        let index = self.index(index)?;
        let mut updates = Vec::new();
        let mut seen: HashSet<(EntityId, String)> = HashSet::new();
        for event in events {
            let schema = index
                .schema(&event.schema)
                .filter(|s| s.is_event())
                .ok_or_else(|| Error::InvalidInput(format!("'{}' is not an event schema of this index", event.schema)))?;
            self.store
                .write_object_blob(&event.entity_id(), event_blob(event, &schema.id_field))
                .await?;

            let event = Arc::new(event.clone());
            for node in index.event_nodes_for(&event.schema) {
                let NodeKind::EventAggregation(params) = node.kind() else { continue };
                let Some(object_id) = event.reference(&params.affected.reference_field) else {
                    continue;
                };
                let entity = EntityId::new(params.affected.schema.clone(), object_id);
                if seen.insert((entity.clone(), event.id.clone())) {
                    updates.push(EntityUpdate::for_event(entity, Arc::clone(&event)));
                }
            }
        }
        tracing::debug!(n_updates = updates.len(), "mapped events onto affected entities");
        self.evaluator.evaluate(index.node(), &updates, context).await
    }

    pub async fn query(&self, index: &str, query: &Query) -> Result<Vec<SearchResult>> {
        let context = ExecutionContext::query(Arc::clone(&self.registry));
        self.query_with_context(index, query, &context).await
    }

    #[instrument(skip(self, query, context), fields(schema = %query.schema()))]
    pub async fn query_with_context(
        &self,
        index: &str,
        query: &Query,
        context: &ExecutionContext,
    ) -> Result<Vec<SearchResult>> {
        let index = self.index(index)?;
        let vector = QueryVectorFactory::new(&index, &self.store).build(query, context).await?;
        let search = KnnSearch {
            index_node: index.node().id().clone(),
            schema: query.schema().to_string(),
            returned_fields: query.returned_fields().to_vec(),
            vector,
            limit: query.limit_or(self.config.default_query_limit),
            radius: query.radius_value(),
            filters: query.filters().to_vec(),
        };
        self.store.knn_search(&search).await
    }
}

fn event_blob(event: &EventRecord, id_field: &str) -> Map<String, Value> {
    let mut blob: Map<String, Value> = event
        .fields
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    for (field, object_id) in &event.references {
        blob.insert(field.clone(), Value::String(object_id.clone()));
    }
    blob.insert(CREATED_AT_FIELD.to_string(), Value::from(event.created_at));
    blob.insert(id_field.to_string(), Value::String(event.id.clone()));
    blob
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacefold_core::{FieldType, FieldValue};
    use spacefold_schema::{HashingTextEngine, Schema, Space};
    use spacefold_storage::InMemoryStore;

    fn engine() -> Engine {
        let registry = EmbeddingRegistry::new().with_engine(Arc::new(HashingTextEngine::new(16)));
        Engine::new(Arc::new(InMemoryStore::new()), Arc::new(registry), EngineConfig::default()).unwrap()
    }

    fn index() -> Index {
        Index::builder("docs")
            .space(Space::text("text", "hashing", 16).bind("doc", "body"))
            .schema(Schema::entity("doc").field("body", FieldType::String))
            .build()
            .unwrap()
    }

    fn doc(id: &str, body: &str) -> Record {
        Record::new("doc", id).with_field("body", FieldValue::String(body.to_string()))
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let engine = engine();
        engine.add_index(index()).unwrap();
        assert!(matches!(engine.add_index(index()), Err(Error::InvalidConfig(_))));
        assert!(matches!(engine.index("other"), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_ingest_writes_blob_and_vector() {
        let engine = engine();
        let index = engine.add_index(index()).unwrap();
        let results = engine.ingest("docs", &[doc("1", "red running shoes")]).await.unwrap();
        assert_eq!(results[0].as_ref().unwrap().main_vector().unwrap().dim(), 16);

        let entity = EntityId::new("doc", "1");
        let blob = engine.store().read_object_blob(&entity).await.unwrap().unwrap();
        assert_eq!(blob.get("id"), Some(&Value::String("1".to_string())));
        assert!(engine
            .store()
            .read_node_result(&entity, index.node().id())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_ingest_rejects_unknown_schema() {
        let engine = engine();
        engine.add_index(index()).unwrap();
        let record = Record::new("other", "1");
        assert!(matches!(engine.ingest("docs", &[record]).await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_query_ranks_closest_first() {
        let engine = engine();
        engine.add_index(index()).unwrap();
        engine
            .ingest("docs", &[doc("1", "red running shoes"), doc("2", "quarterly tax report")])
            .await
            .unwrap();

        let query = Query::new("doc")
            .similar("text", FieldValue::String("red running shoes".to_string()))
            .select(["body"])
            .limit(1);
        let results = engine.query("docs", &query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity.object_id, "1");
        assert_eq!(
            results[0].fields.get("body"),
            Some(&Value::String("red running shoes".to_string()))
        );
    }
}
