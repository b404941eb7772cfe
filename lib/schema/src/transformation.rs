//! Embedding, aggregation and normalization policies of one space.

use crate::aggregation::AggregationConfig;
use crate::context::ExecutionContext;
use crate::embedding::{Embedding, EmbeddingConfig};
use crate::normalization::NormalizationConfig;
use serde::{Deserialize, Serialize};
use spacefold_core::{FieldValue, Result, Vector, Weighted};
use std::fmt;
use std::sync::Arc;

/// Pure configuration, shared by reference between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationConfig {
    pub normalization: NormalizationConfig,
    pub aggregation: AggregationConfig,
    pub embedding: EmbeddingConfig,
}

impl TransformationConfig {
    /// L2 normalization and the embedding's default aggregation.
    pub fn new(embedding: EmbeddingConfig) -> Self {
        Self {
            normalization: NormalizationConfig::L2,
            aggregation: embedding.default_aggregation(),
            embedding,
        }
    }

    #[must_use]
    pub fn with_normalization(mut self, normalization: NormalizationConfig) -> Self {
        self.normalization = normalization;
        self
    }

    #[must_use]
    pub fn with_aggregation(mut self, aggregation: AggregationConfig) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn length(&self) -> usize {
        self.embedding.length()
    }

    pub fn build(self: &Arc<Self>) -> Result<Transformation> {
        self.normalization.validate()?;
        Ok(Transformation {
            config: Arc::clone(self),
            embedding: self.embedding.build()?,
        })
    }
}

/// An instantiated [`TransformationConfig`].
#[derive(Clone)]
pub struct Transformation {
    config: Arc<TransformationConfig>,
    embedding: Arc<dyn Embedding>,
}

impl Transformation {
    pub fn config(&self) -> &Arc<TransformationConfig> {
        &self.config
    }

    pub fn length(&self) -> usize {
        self.embedding.length()
    }

    pub fn normalize(&self, vector: &Vector) -> Vector {
        self.config.normalization.normalize(vector)
    }

    /// Normalized vector for entities without a value.
    pub fn default_vector(&self) -> Vector {
        self.normalize(&self.embedding.default_vector())
    }

    pub async fn embed(&self, input: &FieldValue, context: &ExecutionContext) -> Result<Vector> {
        let vector = self.embedding.embed(input, context).await?;
        Ok(self.normalize(&vector))
    }

    pub async fn embed_batch(&self, inputs: &[FieldValue], context: &ExecutionContext) -> Result<Vec<Vector>> {
        let vectors = self.embedding.embed_batch(inputs, context).await?;
        Ok(vectors.iter().map(|v| self.normalize(v)).collect())
    }

    /// Aggregate and normalize.
    pub async fn aggregate(&self, items: &[Weighted<Vector>], context: &ExecutionContext) -> Result<Vector> {
        let vector = self.aggregate_unnormalized(items, context).await?;
        Ok(self.normalize(&vector))
    }

    /// Aggregate without the final normalization.
    ///
    /// Invertible embeddings are aggregated in input space: every vector is
    /// inverse-embedded, the numbers are combined, and the result embedded again.
    pub async fn aggregate_unnormalized(
        &self,
        items: &[Weighted<Vector>],
        context: &ExecutionContext,
    ) -> Result<Vector> {
        if !self.embedding.needs_inversion() {
            return self.config.aggregation.aggregate_vectors(items);
        }

        let mut numbers = Vec::with_capacity(items.len());
        for weighted in items.iter().filter(|w| w.weight != 0.0 && !w.item.is_empty()) {
            let input = self.embedding.inverse_embed(&weighted.item.denormalize(), context)?;
            if let Some(value) = input.as_f64() {
                numbers.push(Weighted::new(value, weighted.weight));
            }
        }
        if numbers.is_empty() {
            return Ok(Vector::empty());
        }
        let value = self.config.aggregation.aggregate_numbers(&numbers)?;
        self.embedding.embed(&FieldValue::Float(value), context).await
    }
}

impl fmt::Debug for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformation")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{NumberEmbeddingConfig, NumberMode};
    use crate::registry::EmbeddingRegistry;

    fn context() -> ExecutionContext {
        ExecutionContext::online(Arc::new(EmbeddingRegistry::new()))
    }

    #[tokio::test]
    async fn test_orthogonal_sum_is_45_degrees() {
        let config = Arc::new(TransformationConfig::new(EmbeddingConfig::Custom { length: 2 }));
        let transformation = config.build().unwrap();
        let result = transformation
            .aggregate(
                &[
                    Weighted::from(Vector::new(vec![1.0, 0.0])),
                    Weighted::from(Vector::new(vec![0.0, 1.0])),
                ],
                &context(),
            )
            .await
            .unwrap();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((result.as_slice()[0] - expected).abs() < 1e-6);
        assert!((result.as_slice()[1] - expected).abs() < 1e-6);
        assert!((result.norm() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_number_aggregation_goes_through_inversion() {
        let config = Arc::new(TransformationConfig::new(EmbeddingConfig::Number(NumberEmbeddingConfig::new(
            0.0,
            100.0,
            NumberMode::Similar,
        ))));
        assert_eq!(config.aggregation, AggregationConfig::Avg);
        let transformation = config.build().unwrap();
        let ctx = context();
        let low = transformation.embed(&FieldValue::Float(20.0), &ctx).await.unwrap();
        let high = transformation.embed(&FieldValue::Float(40.0), &ctx).await.unwrap();
        let avg = transformation
            .aggregate(&[Weighted::from(low), Weighted::from(high)], &ctx)
            .await
            .unwrap();
        let expected = transformation.embed(&FieldValue::Float(30.0), &ctx).await.unwrap();
        for (a, b) in avg.as_slice().iter().zip(expected.as_slice()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
