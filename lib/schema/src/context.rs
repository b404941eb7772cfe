use crate::registry::EmbeddingRegistry;
use std::sync::Arc;

/// Per-call evaluation context.
///
/// Carries the evaluation time, whether vectors are built for a query
/// rather than for storage, and the embedding registry.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    now: i64,
    is_query: bool,
    registry: Arc<EmbeddingRegistry>,
}

impl ExecutionContext {
    /// Ingestion context evaluated at the current wall-clock time
    pub fn online(registry: Arc<EmbeddingRegistry>) -> Self {
        Self {
            now: chrono::Utc::now().timestamp(),
            is_query: false,
            registry,
        }
    }

    /// Query context evaluated at the current wall-clock time
    pub fn query(registry: Arc<EmbeddingRegistry>) -> Self {
        Self {
            is_query: true,
            ..Self::online(registry)
        }
    }

    /// Pin the evaluation time (unix seconds).
    #[must_use]
    pub fn with_now(mut self, now: i64) -> Self {
        self.now = now;
        self
    }

    /// Same time and registry, in query mode.
    #[must_use]
    pub fn to_query(&self) -> Self {
        Self {
            is_query: true,
            ..self.clone()
        }
    }

    #[inline]
    pub fn now(&self) -> i64 {
        self.now
    }

    #[inline]
    pub fn is_query(&self) -> bool {
        self.is_query
    }

    #[inline]
    pub fn registry(&self) -> &Arc<EmbeddingRegistry> {
        &self.registry
    }
}
