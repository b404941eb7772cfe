use super::Embedding;
use crate::context::ExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spacefold_core::{Error, FieldValue, Result, Vector};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEmbeddingConfig {
    pub categories: Vec<String>,
    /// Map unknown categories onto an extra trailing "other" dimension
    #[serde(default)]
    pub uncategorized_as_category: bool,
    #[serde(default)]
    pub negative_filter: f32,
}

impl CategoricalEmbeddingConfig {
    pub fn new(categories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            uncategorized_as_category: false,
            negative_filter: 0.0,
        }
    }

    #[must_use]
    pub fn with_uncategorized_as_category(mut self) -> Self {
        self.uncategorized_as_category = true;
        self
    }

    #[must_use]
    pub fn with_negative_filter(mut self, negative_filter: f32) -> Self {
        self.negative_filter = negative_filter;
        self
    }

    pub fn length(&self) -> usize {
        self.categories.len() + usize::from(self.uncategorized_as_category)
    }
}

/// N-hot encoding over a fixed category list.
///
/// Stored vectors hold `1/sqrt(n)` on matching categories and the negative
/// filter everywhere else; query vectors hold `sqrt(n)/k` for `k` requested
/// categories and zero elsewhere.
#[derive(Debug, Clone)]
pub struct CategoricalEmbedding {
    config: CategoricalEmbeddingConfig,
    index: HashMap<String, usize>,
}

impl CategoricalEmbedding {
    pub fn new(config: CategoricalEmbeddingConfig) -> Result<Self> {
        if config.categories.is_empty() {
            return Err(Error::InvalidConfig("categorical embedding needs categories".to_string()));
        }
        let index = config
            .categories
            .iter()
            .enumerate()
            .map(|(i, category)| (category.clone(), i))
            .collect();
        Ok(Self { config, index })
    }

    fn category_index(&self, category: &str) -> Option<usize> {
        self.index.get(category).copied().or_else(|| {
            self.config
                .uncategorized_as_category
                .then_some(self.config.categories.len())
        })
    }

    fn encoding_value(&self, n_inputs: usize, is_query: bool) -> f32 {
        let sqrt_categories = (self.config.categories.len() as f32).sqrt();
        if is_query {
            sqrt_categories / n_inputs.max(1) as f32
        } else {
            1.0 / sqrt_categories
        }
    }
}

#[async_trait]
impl Embedding for CategoricalEmbedding {
    fn length(&self) -> usize {
        self.config.length()
    }

    fn default_vector(&self) -> Vector {
        let length = self.length();
        Vector::with_negative_filter(vec![self.config.negative_filter; length], 0..length as i64)
            .unwrap_or_else(|_| Vector::zeros(length))
    }

    fn inverse_embed(&self, vector: &Vector, _context: &ExecutionContext) -> Result<FieldValue> {
        let other = format!(
            "{}_",
            self.config.categories.iter().max_by_key(|c| c.len()).map(String::as_str).unwrap_or("")
        );
        let categories = (0..vector.dim())
            .filter(|&i| !vector.is_filtered(i) && vector.as_slice()[i] != 0.0)
            .map(|i| self.config.categories.get(i).cloned().unwrap_or_else(|| other.clone()))
            .collect();
        Ok(FieldValue::StringList(categories))
    }

    async fn embed(&self, input: &FieldValue, context: &ExecutionContext) -> Result<Vector> {
        let inputs: Vec<&str> = match input {
            FieldValue::String(s) => vec![s.as_str()],
            FieldValue::StringList(items) => items.iter().map(String::as_str).collect(),
            other => return Err(Error::InvalidInput(format!("expected categories, got {:?}", other))),
        };
        if inputs.is_empty() {
            return Ok(self.default_vector());
        }

        let matched: BTreeSet<usize> = inputs.iter().filter_map(|c| self.category_index(c)).collect();
        let fill = if context.is_query() { 0.0 } else { self.config.negative_filter };
        let value = self.encoding_value(inputs.len(), context.is_query());
        let data = (0..self.length())
            .map(|i| if matched.contains(&i) { value } else { fill })
            .collect();
        let filtered = (0..self.length()).filter(|i| !matched.contains(i)).map(|i| i as i64);
        Vector::with_negative_filter(data, filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EmbeddingRegistry;
    use std::sync::Arc;

    fn embedding() -> CategoricalEmbedding {
        CategoricalEmbedding::new(
            CategoricalEmbeddingConfig::new(["a", "b", "c", "d"]).with_negative_filter(-1.0),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ingestion_encoding() {
        let context = ExecutionContext::online(Arc::new(EmbeddingRegistry::new()));
        let v = embedding()
            .embed(&FieldValue::StringList(vec!["b".to_string()]), &context)
            .await
            .unwrap();
        assert_eq!(v.as_slice(), &[-1.0, 0.5, -1.0, -1.0]);
        assert_eq!(v.negative_filter_indices().len(), 3);
    }

    #[tokio::test]
    async fn test_query_encoding() {
        let context = ExecutionContext::query(Arc::new(EmbeddingRegistry::new()));
        let v = embedding()
            .embed(&FieldValue::StringList(vec!["a".to_string(), "c".to_string()]), &context)
            .await
            .unwrap();
        assert_eq!(v.as_slice(), &[1.0, 0.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_uncategorized_slot() {
        let context = ExecutionContext::online(Arc::new(EmbeddingRegistry::new()));
        let embedding = CategoricalEmbedding::new(
            CategoricalEmbeddingConfig::new(["a"]).with_uncategorized_as_category(),
        )
        .unwrap();
        let v = embedding.embed(&FieldValue::String("zzz".to_string()), &context).await.unwrap();
        assert_eq!(v.as_slice(), &[0.0, 1.0]);

        let inverse = embedding.inverse_embed(&v, &context).unwrap();
        assert_eq!(inverse, FieldValue::StringList(vec!["a_".to_string()]));
    }
}
