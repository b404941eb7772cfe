//! # spacefold
//!
//! Multi-space vector indexing for structured records.
//!
//! Records are embedded into several independently configured spaces (text,
//! number, category, recency, image, custom), combined into one vector per
//! entity and kept current as records and time-stamped events arrive. At
//! query time the stored vectors are split back into their spaces so each
//! space can be re-weighted on its own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spacefold::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<()> {
//! let registry = EmbeddingRegistry::new().with_engine(Arc::new(HashingTextEngine::new(64)));
//! let engine = Engine::new(Arc::new(InMemoryStore::new()), Arc::new(registry), EngineConfig::default())?;
//!
//! let index = Index::builder("products")
//!     .space(Space::text("description", "hashing", 64).bind("product", "description"))
//!     .space(
//!         Space::number("price", NumberEmbeddingConfig::new(0.0, 1000.0, NumberMode::Minimum))
//!             .bind("product", "price"),
//!     )
//!     .schema(
//!         Schema::entity("product")
//!             .field("description", FieldType::String)
//!             .field("price", FieldType::Float),
//!     )
//!     .build()?;
//! engine.add_index(index)?;
//!
//! let product = Record::new("product", "p1")
//!     .with_field("description", FieldValue::String("trail running shoes".into()))
//!     .with_field("price", FieldValue::Float(89.0));
//! engine.ingest("products", &[product]).await?;
//!
//! let query = Query::new("product")
//!     .similar("description", FieldValue::String("running".into()))
//!     .space_weight("price", 0.5)
//!     .limit(10);
//! let hits = engine.query("products", &query).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`spacefold-core`](spacefold_core) - Vector algebra, ids, field values, errors
//! - [`spacefold-schema`](spacefold_schema) - Schemas, records, embeddings, spaces, chunking
//! - [`spacefold-dag`](spacefold_dag) - Node graph, effects, indices and evaluation plans
//! - [`spacefold-storage`](spacefold_storage) - Storage boundary and the in-memory backend
//! - [`spacefold-engine`](spacefold_engine) - Online evaluation, event aggregation, queries

// Re-export core types
pub use spacefold_core::{
    ComparisonOp, ComparisonOperation, EntityId, Error, FieldType, FieldValue, NodeId, NodeValue, Result,
    Vector, Weighted,
};

// Re-export schema and embeddings
pub use spacefold_schema::{
    AggregationConfig, CategoricalEmbeddingConfig, ChunkingConfig, EmbeddingConfig, EmbeddingEngine,
    EmbeddingRegistry, EntityUpdate, EventRecord, ExecutionContext, HashingTextEngine, NormalizationConfig,
    NumberEmbeddingConfig, NumberMode, NumberScale, PeriodTime, Record, RecencyEmbeddingConfig, Schema, Space,
    TransformationConfig,
};

// Re-export graph
pub use spacefold_dag::{Effect, Index, IndexConfig, Node, NodeKind, SchemaReference};

// Re-export storage
pub use spacefold_storage::{EntityStore, InMemoryStore, KnnSearch, SearchResult};

// Re-export engine
pub use spacefold_engine::{Engine, EngineConfig, EvaluationResult, OnlineEvaluator, Query};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ComparisonOperation, Effect, EmbeddingRegistry, Engine, EngineConfig, EntityId, Error, EventRecord,
        FieldType, FieldValue, HashingTextEngine, Index, IndexConfig, InMemoryStore, NumberEmbeddingConfig,
        NumberMode, Query, Record, Result, Schema, SchemaReference, Space, Vector,
    };
}
