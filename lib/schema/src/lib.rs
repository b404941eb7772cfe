//! # spacefold Schema
//!
//! Declarative description of what gets embedded and how.
//!
//! ## Overview
//!
//! - [`Schema`] declares the typed fields of an entity or event record and
//!   parses JSON into [`Record`]s and [`EventRecord`]s.
//! - A [`Space`] pairs one [`TransformationConfig`] (embedding, aggregation
//!   and normalization policy) with the field it reads on each schema.
//! - The [`Embedding`] trait is the embedding boundary. Number, categorical,
//!   recency and custom embeddings run in process; text and image spaces
//!   delegate to an [`EmbeddingEngine`] looked up in the
//!   [`EmbeddingRegistry`] carried by the [`ExecutionContext`].
//!
//! ## Example
//!
//! ```rust
//! use spacefold_schema::{Schema, Space, NumberEmbeddingConfig, NumberMode};
//! use spacefold_core::FieldType;
//!
//! let product = Schema::entity("product")
//!     .field("description", FieldType::String)
//!     .field("price", FieldType::Float);
//!
//! let price = Space::number("price", NumberEmbeddingConfig::new(0.0, 1000.0, NumberMode::Similar))
//!     .bind("product", "price");
//! assert_eq!(price.length(), 3);
//! assert!(product.get_field("price").is_some());
//! ```

pub mod aggregation;
pub mod chunker;
pub mod context;
pub mod embedding;
pub mod hashing;
pub mod normalization;
pub mod record;
pub mod registry;
pub mod schema;
pub mod space;
pub mod transformation;

pub use aggregation::AggregationConfig;
pub use chunker::{chunk_text, ChunkingConfig};
pub use context::ExecutionContext;
pub use embedding::{
    CategoricalEmbedding, CategoricalEmbeddingConfig, CustomEmbedding, Embedding, EmbeddingConfig, Modality,
    ModelEmbedding, NumberEmbedding, NumberEmbeddingConfig, NumberMode, NumberScale, PeriodTime, RecencyEmbedding,
    RecencyEmbeddingConfig,
};
pub use hashing::hash_text_to_vector;
pub use normalization::NormalizationConfig;
pub use record::{EntityUpdate, EventRecord, Record};
pub use registry::{EmbeddingEngine, EmbeddingRegistry, HashingTextEngine};
pub use schema::{Schema, SchemaField, SchemaKind, CREATED_AT_FIELD};
pub use space::{Space, SpaceInput};
pub use transformation::{Transformation, TransformationConfig};
