//! Embedding boundary
//!
//! Every space embeds its input through an [`Embedding`]. Number,
//! categorical, recency and custom embeddings are computed in process;
//! text and image embeddings delegate to a named engine in the registry.

mod categorical;
mod model;
mod number;
mod recency;

pub use categorical::{CategoricalEmbedding, CategoricalEmbeddingConfig};
pub use model::{CustomEmbedding, Modality, ModelEmbedding};
pub use number::{NumberEmbedding, NumberEmbeddingConfig, NumberMode, NumberScale};
pub use recency::{PeriodTime, RecencyEmbedding, RecencyEmbeddingConfig};

use crate::aggregation::AggregationConfig;
use crate::context::ExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spacefold_core::{Error, FieldType, FieldValue, Result, Vector};
use std::fmt;
use std::sync::Arc;

#[async_trait]
pub trait Embedding: Send + Sync + fmt::Debug {
    /// Output dimension
    fn length(&self) -> usize;

    /// Vector used when an entity has no value for the embedded field
    fn default_vector(&self) -> Vector {
        Vector::zeros(self.length())
    }

    /// Whether aggregation must go through `inverse_embed` instead of
    /// summing vectors
    fn needs_inversion(&self) -> bool {
        false
    }

    fn inverse_embed(&self, _vector: &Vector, _context: &ExecutionContext) -> Result<FieldValue> {
        Err(Error::Embedding(format!("{:?} is not invertible", self)))
    }

    async fn embed(&self, input: &FieldValue, context: &ExecutionContext) -> Result<Vector>;

    async fn embed_batch(&self, inputs: &[FieldValue], context: &ExecutionContext) -> Result<Vec<Vector>> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for input in inputs {
            vectors.push(self.embed(input, context).await?);
        }
        Ok(vectors)
    }
}

/// Serializable description of an embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingConfig {
    Text { model: String, length: usize },
    Image { model: String, length: usize },
    Number(NumberEmbeddingConfig),
    Categorical(CategoricalEmbeddingConfig),
    Recency(RecencyEmbeddingConfig),
    Custom { length: usize },
}

impl EmbeddingConfig {
    pub fn length(&self) -> usize {
        match self {
            EmbeddingConfig::Text { length, .. }
            | EmbeddingConfig::Image { length, .. }
            | EmbeddingConfig::Custom { length } => *length,
            EmbeddingConfig::Number(_) => NumberEmbeddingConfig::LENGTH,
            EmbeddingConfig::Categorical(config) => config.length(),
            EmbeddingConfig::Recency(config) => config.length(),
        }
    }

    /// Whether a field of `field_type` can feed this embedding.
    pub fn accepts(&self, field_type: FieldType) -> bool {
        match self {
            EmbeddingConfig::Text { .. } => field_type == FieldType::String,
            EmbeddingConfig::Image { .. } => matches!(field_type, FieldType::Blob | FieldType::String),
            EmbeddingConfig::Number(_) => matches!(field_type, FieldType::Float | FieldType::Int),
            EmbeddingConfig::Categorical(_) => matches!(field_type, FieldType::String | FieldType::StringList),
            EmbeddingConfig::Recency(_) => field_type == FieldType::Timestamp,
            EmbeddingConfig::Custom { .. } => field_type == FieldType::FloatList,
        }
    }

    pub fn default_aggregation(&self) -> AggregationConfig {
        match self {
            EmbeddingConfig::Number(_) => AggregationConfig::Avg,
            EmbeddingConfig::Recency(_) => AggregationConfig::Max,
            _ => AggregationConfig::Sum,
        }
    }

    /// Validate and instantiate.
    pub fn build(&self) -> Result<Arc<dyn Embedding>> {
        if self.length() == 0 {
            return Err(Error::InvalidConfig(format!("{:?} has zero length", self)));
        }
        let embedding: Arc<dyn Embedding> = match self {
            EmbeddingConfig::Text { model, length } => {
                Arc::new(ModelEmbedding::new(model.clone(), *length, Modality::Text))
            }
            EmbeddingConfig::Image { model, length } => {
                Arc::new(ModelEmbedding::new(model.clone(), *length, Modality::Image))
            }
            EmbeddingConfig::Number(config) => Arc::new(NumberEmbedding::new(config.clone())?),
            EmbeddingConfig::Categorical(config) => Arc::new(CategoricalEmbedding::new(config.clone())?),
            EmbeddingConfig::Recency(config) => Arc::new(RecencyEmbedding::new(config.clone())?),
            EmbeddingConfig::Custom { length } => Arc::new(CustomEmbedding::new(*length)),
        };
        Ok(embedding)
    }
}

pub(crate) fn number_input(input: &FieldValue) -> Result<f64> {
    input
        .as_f64()
        .ok_or_else(|| Error::InvalidInput(format!("expected a number, got {:?}", input)))
}
