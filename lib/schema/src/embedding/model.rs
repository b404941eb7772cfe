use super::Embedding;
use crate::context::ExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spacefold_core::{Error, FieldValue, Result, Vector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

/// Embedding computed by a named engine from the registry.
#[derive(Debug, Clone)]
pub struct ModelEmbedding {
    model: String,
    length: usize,
    modality: Modality,
}

impl ModelEmbedding {
    pub fn new(model: impl Into<String>, length: usize, modality: Modality) -> Self {
        Self {
            model: model.into(),
            length,
            modality,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn input_text(&self, input: &FieldValue) -> Result<String> {
        input.as_str().map(str::to_string).ok_or_else(|| {
            Error::InvalidInput(format!("{:?} embedding expects a string, got {:?}", self.modality, input))
        })
    }
}

#[async_trait]
impl Embedding for ModelEmbedding {
    fn length(&self) -> usize {
        self.length
    }

    async fn embed(&self, input: &FieldValue, context: &ExecutionContext) -> Result<Vector> {
        let mut vectors = self.embed_batch(std::slice::from_ref(input), context).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding(format!("engine '{}' returned no vector", self.model)))
    }

    async fn embed_batch(&self, inputs: &[FieldValue], context: &ExecutionContext) -> Result<Vec<Vector>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let texts = inputs.iter().map(|input| self.input_text(input)).collect::<Result<Vec<_>>>()?;
        let engine = context.registry().get(&self.model)?;
        let vectors = engine.embed_batch(&texts, context.is_query()).await?;
        if vectors.len() != inputs.len() {
            return Err(Error::Embedding(format!(
                "engine '{}' returned {} vectors for {} inputs",
                self.model,
                vectors.len(),
                inputs.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.dim() != self.length) {
            return Err(Error::DimensionMismatch {
                expected: self.length,
                actual: bad.dim(),
            });
        }
        Ok(vectors)
    }
}

/// Caller-computed vectors passed in as float lists.
#[derive(Debug, Clone)]
pub struct CustomEmbedding {
    length: usize,
}

impl CustomEmbedding {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

#[async_trait]
impl Embedding for CustomEmbedding {
    fn length(&self) -> usize {
        self.length
    }

    async fn embed(&self, input: &FieldValue, _context: &ExecutionContext) -> Result<Vector> {
        match input {
            FieldValue::FloatList(values) if values.len() == self.length => {
                Ok(Vector::new(values.iter().map(|&v| v as f32).collect()))
            }
            FieldValue::FloatList(values) => Err(Error::DimensionMismatch {
                expected: self.length,
                actual: values.len(),
            }),
            other => Err(Error::InvalidInput(format!("expected a float list, got {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EmbeddingRegistry, HashingTextEngine};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_model_embedding_uses_registry() {
        let registry = Arc::new(EmbeddingRegistry::new().with_engine(Arc::new(HashingTextEngine::new(32))));
        let context = ExecutionContext::online(registry);
        let embedding = ModelEmbedding::new("hashing", 32, Modality::Text);
        let v = embedding.embed(&FieldValue::String("red shoes".to_string()), &context).await.unwrap();
        assert_eq!(v.dim(), 32);

        let wrong = ModelEmbedding::new("hashing", 16, Modality::Text);
        assert!(matches!(
            wrong.embed(&FieldValue::String("x".to_string()), &context).await,
            Err(Error::DimensionMismatch { expected: 16, actual: 32 })
        ));
    }

    #[tokio::test]
    async fn test_custom_embedding_length_check() {
        let context = ExecutionContext::online(Arc::new(EmbeddingRegistry::new()));
        let embedding = CustomEmbedding::new(2);
        let v = embedding.embed(&FieldValue::FloatList(vec![0.5, 1.5]), &context).await.unwrap();
        assert_eq!(v.as_slice(), &[0.5, 1.5]);
        assert!(embedding.embed(&FieldValue::FloatList(vec![1.0]), &context).await.is_err());
    }
}
