//! Spaces: a transformation plus the schema fields it reads.

use crate::chunker::ChunkingConfig;
use crate::embedding::{
    CategoricalEmbeddingConfig, EmbeddingConfig, NumberEmbeddingConfig, RecencyEmbeddingConfig,
};
use crate::aggregation::AggregationConfig;
use crate::normalization::NormalizationConfig;
use crate::transformation::{Transformation, TransformationConfig};
use serde::{Deserialize, Serialize};
use spacefold_core::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The field a space reads for one schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceInput {
    pub field: String,
    /// Present when the field is split into chunks before embedding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunking: Option<ChunkingConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    pub transformation: Arc<TransformationConfig>,
    /// Bound field per schema name
    #[serde(default)]
    pub inputs: BTreeMap<String, SpaceInput>,
}

impl Space {
    pub fn new(id: impl Into<String>, embedding: EmbeddingConfig) -> Self {
        Self {
            id: id.into(),
            transformation: Arc::new(TransformationConfig::new(embedding)),
            inputs: BTreeMap::new(),
        }
    }

    pub fn text(id: impl Into<String>, model: impl Into<String>, length: usize) -> Self {
        Self::new(
            id,
            EmbeddingConfig::Text {
                model: model.into(),
                length,
            },
        )
    }

    pub fn image(id: impl Into<String>, model: impl Into<String>, length: usize) -> Self {
        Self::new(
            id,
            EmbeddingConfig::Image {
                model: model.into(),
                length,
            },
        )
    }

    pub fn number(id: impl Into<String>, config: NumberEmbeddingConfig) -> Self {
        Self::new(id, EmbeddingConfig::Number(config))
    }

    pub fn categorical(id: impl Into<String>, config: CategoricalEmbeddingConfig) -> Self {
        Self::new(id, EmbeddingConfig::Categorical(config))
    }

    pub fn recency(id: impl Into<String>, config: RecencyEmbeddingConfig) -> Self {
        Self::new(id, EmbeddingConfig::Recency(config))
    }

    pub fn custom(id: impl Into<String>, length: usize) -> Self {
        Self::new(id, EmbeddingConfig::Custom { length })
    }

    #[must_use]
    pub fn with_normalization(mut self, normalization: NormalizationConfig) -> Self {
        self.transformation = Arc::new((*self.transformation).clone().with_normalization(normalization));
        self
    }

    #[must_use]
    pub fn with_aggregation(mut self, aggregation: AggregationConfig) -> Self {
        self.transformation = Arc::new((*self.transformation).clone().with_aggregation(aggregation));
        self
    }

    /// Read `field` of `schema` through this space.
    #[must_use]
    pub fn bind(mut self, schema: impl Into<String>, field: impl Into<String>) -> Self {
        self.inputs.insert(
            schema.into(),
            SpaceInput {
                field: field.into(),
                chunking: None,
            },
        );
        self
    }

    /// Like [`Space::bind`], embedding the field chunk by chunk.
    #[must_use]
    pub fn bind_chunked(
        mut self,
        schema: impl Into<String>,
        field: impl Into<String>,
        chunking: ChunkingConfig,
    ) -> Self {
        self.inputs.insert(
            schema.into(),
            SpaceInput {
                field: field.into(),
                chunking: Some(chunking),
            },
        );
        self
    }

    pub fn input(&self, schema: &str) -> Option<&SpaceInput> {
        self.inputs.get(schema)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    pub fn length(&self) -> usize {
        self.transformation.length()
    }

    pub fn build_transformation(&self) -> Result<Transformation> {
        self.transformation.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::NumberMode;

    #[test]
    fn test_binding() {
        let space = Space::number("price", NumberEmbeddingConfig::new(0.0, 100.0, NumberMode::Similar))
            .bind("product", "price")
            .bind("offer", "amount");
        assert_eq!(space.length(), 3);
        assert_eq!(space.input("offer").map(|i| i.field.as_str()), Some("amount"));
        assert!(space.input("user").is_none());
        assert_eq!(space.schemas().collect::<Vec<_>>(), vec!["offer", "product"]);
    }

    #[test]
    fn test_with_aggregation_keeps_embedding() {
        let space = Space::custom("c", 4).with_aggregation(AggregationConfig::Max);
        assert_eq!(space.transformation.aggregation, AggregationConfig::Max);
        assert_eq!(space.length(), 4);
    }
}
