//! Embedding engines and the registry that owns them.
//!
//! Model-backed spaces (text, image) do not compute vectors themselves:
//! they look up an [`EmbeddingEngine`] by name in the [`EmbeddingRegistry`]
//! carried by the execution context.

use crate::hashing::hash_text_to_vector;
use async_trait::async_trait;
use parking_lot::RwLock;
use spacefold_core::{Error, Result, Vector};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// External model-serving collaborator.
#[async_trait]
pub trait EmbeddingEngine: Send + Sync {
    /// Name spaces refer to this engine by
    fn name(&self) -> &str;

    /// Output dimension
    fn length(&self) -> usize;

    async fn embed_batch(&self, inputs: &[String], is_query: bool) -> Result<Vec<Vector>>;
}

/// Named embedding engines, constructed once and shared through the
/// execution context.
#[derive(Default)]
pub struct EmbeddingRegistry {
    engines: RwLock<HashMap<String, Arc<dyn EmbeddingEngine>>>,
}

impl EmbeddingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_engine(self, engine: Arc<dyn EmbeddingEngine>) -> Self {
        self.register(engine);
        self
    }

    /// Register an engine, replacing any engine of the same name
    pub fn register(&self, engine: Arc<dyn EmbeddingEngine>) {
        tracing::debug!(engine = engine.name(), length = engine.length(), "registered embedding engine");
        self.engines.write().insert(engine.name().to_string(), engine);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn EmbeddingEngine>> {
        self.engines
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Embedding(format!("no embedding engine named '{}'", name)))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for EmbeddingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingRegistry").field("engines", &self.names()).finish()
    }
}

/// In-process text engine based on trigram and word hashing.
#[derive(Debug, Clone)]
pub struct HashingTextEngine {
    name: String,
    length: usize,
}

impl HashingTextEngine {
    pub const DEFAULT_NAME: &'static str = "hashing";

    pub fn new(length: usize) -> Self {
        Self::named(Self::DEFAULT_NAME, length)
    }

    pub fn named(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

#[async_trait]
impl EmbeddingEngine for HashingTextEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn length(&self) -> usize {
        self.length
    }

    async fn embed_batch(&self, inputs: &[String], _is_query: bool) -> Result<Vec<Vector>> {
        Ok(inputs
            .iter()
            .map(|text| Vector::new(hash_text_to_vector(text, self.length)))
            .collect())
    }
}
