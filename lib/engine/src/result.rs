use spacefold_core::{NodeValue, Vector};

/// Output of one node for one entity: the main value plus one value per
/// chunk when the entity was split.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub main: NodeValue,
    pub chunks: Vec<NodeValue>,
}

impl EvaluationResult {
    pub fn new(main: impl Into<NodeValue>) -> Self {
        Self {
            main: main.into(),
            chunks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_chunks(mut self, chunks: Vec<NodeValue>) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn main_vector(&self) -> Option<&Vector> {
        self.main.as_vector()
    }

    /// The chunk's value, or the main value when there is no such chunk.
    pub fn value_for(&self, chunk: Option<usize>) -> &NodeValue {
        chunk.and_then(|k| self.chunks.get(k)).unwrap_or(&self.main)
    }
}
