//! # spacefold Engine
//!
//! Keeps index vectors current and turns queries into vectors:
//!
//! - [`OnlineEvaluator`] - Evaluates an index graph for a batch of entity
//!   updates, level by level, persisting and falling back to stored values
//! - [`EventMetadata`] - Running statistics behind incremental event aggregation
//! - [`Query`] / [`QueryVectorFactory`] - Query description and per-space
//!   reweighting of stored vectors
//! - [`Engine`] - Facade over indices, storage and the embedding registry
//!
//! ## Example
//!
//! ```rust,no_run
//! use spacefold_core::{FieldType, FieldValue};
//! use spacefold_dag::Index;
//! use spacefold_engine::{Engine, EngineConfig, Query};
//! use spacefold_schema::{EmbeddingRegistry, HashingTextEngine, Record, Schema, Space};
//! use spacefold_storage::InMemoryStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> spacefold_core::Result<()> {
//! let registry = EmbeddingRegistry::new().with_engine(Arc::new(HashingTextEngine::new(64)));
//! let engine = Engine::new(Arc::new(InMemoryStore::new()), Arc::new(registry), EngineConfig::default())?;
//! engine.add_index(
//!     Index::builder("articles")
//!         .space(Space::text("body", "hashing", 64).bind("article", "body"))
//!         .schema(Schema::entity("article").field("body", FieldType::String))
//!         .build()?,
//! )?;
//!
//! let article = Record::new("article", "1").with_field("body", FieldValue::String("Rust async runtimes".into()));
//! engine.ingest("articles", &[article]).await?;
//!
//! let query = Query::new("article").similar("body", FieldValue::String("tokio".into()));
//! let hits = engine.query("articles", &query).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod evaluator;
pub mod event;
pub mod query;
pub mod result;

pub use config::EngineConfig;
pub use engine::Engine;
pub use evaluator::OnlineEvaluator;
pub use event::{time_modifier, EventMetadata};
pub use query::{Query, QueryVectorFactory, SimilarClause};
pub use result::EvaluationResult;
