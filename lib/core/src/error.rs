use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid negative filter: {0}")]
    InvalidNegativeFilter(String),

    #[error("Node {node_id} requires a value from a non-nullable parent for {entity}")]
    MissingRequiredParent { node_id: String, entity: String },

    #[error("DAG exceeds the maximum depth of {max_depth}")]
    MaxDagDepthExceeded { max_depth: usize },

    #[error("Evaluation of node {node_id} failed for {entity}: {source}")]
    NodeEvaluation {
        node_id: String,
        entity: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Node {node_id} has no stored value for ({schema}, {object_id})")]
    StaleOrMissingStoredResult {
        node_id: String,
        schema: String,
        object_id: String,
    },

    #[error("Query binding error: {0}")]
    QueryBinding(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Division by zero")]
    ZeroDivision,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Errors caused by index configuration rather than by a single entity.
    /// These are never wrapped with node context.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::DimensionMismatch { .. }
                | Error::InvalidNegativeFilter(_)
                | Error::MaxDagDepthExceeded { .. }
                | Error::MissingRequiredParent { .. }
                | Error::StaleOrMissingStoredResult { .. }
                | Error::NodeEvaluation { .. }
        )
    }
}
