use serde::{Deserialize, Serialize};
use spacefold_core::{Error, Result};

/// Runtime settings of an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Chunk inputs sent to an embedding per call
    pub chunk_batch_size: usize,
    /// Result count when a query sets no limit
    pub default_query_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_batch_size: 64,
            default_query_limit: 10,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_batch_size == 0 {
            return Err(Error::InvalidConfig("chunk_batch_size must be positive".to_string()));
        }
        if self.default_query_limit == 0 {
            return Err(Error::InvalidConfig("default_query_limit must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_defaults() {
        let config = EngineConfig::from_json(r#"{"chunk_batch_size": 8}"#).unwrap();
        assert_eq!(config.chunk_batch_size, 8);
        assert_eq!(config.default_query_limit, 10);
        assert!(EngineConfig::from_json(r#"{"chunk_batch_size": 0}"#).is_err());
        assert!(EngineConfig::from_json("not json").is_err());
    }
}
