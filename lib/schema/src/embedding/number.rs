use super::{number_input, Embedding};
use crate::context::ExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spacefold_core::{Error, FieldValue, Result, Vector};
use std::f64::consts::FRAC_PI_2;

const LOG_BASE: f64 = 10.0;
const FILTER_INDEX: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberMode {
    /// Closer numbers are more similar
    Similar,
    /// Smaller numbers rank higher at query time
    Minimum,
    /// Larger numbers rank higher at query time
    Maximum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NumberScale {
    #[default]
    Linear,
    /// `log10(1 + x)` before mapping onto the quarter circle
    Logarithmic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberEmbeddingConfig {
    pub min_value: f64,
    pub max_value: f64,
    pub mode: NumberMode,
    #[serde(default)]
    pub scale: NumberScale,
    #[serde(default)]
    pub negative_filter: f32,
}

impl NumberEmbeddingConfig {
    pub const LENGTH: usize = 3;

    pub fn new(min_value: f64, max_value: f64, mode: NumberMode) -> Self {
        Self {
            min_value,
            max_value,
            mode,
            scale: NumberScale::Linear,
            negative_filter: 0.0,
        }
    }

    #[must_use]
    pub fn with_scale(mut self, scale: NumberScale) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub fn with_negative_filter(mut self, negative_filter: f32) -> Self {
        self.negative_filter = negative_filter;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.scale == NumberScale::Logarithmic && (self.min_value < 0.0 || self.max_value < 0.0) {
            return Err(Error::InvalidConfig(
                "logarithmic scale needs non-negative bounds".to_string(),
            ));
        }
        if self.min_value >= self.max_value {
            return Err(Error::InvalidConfig(format!(
                "maximum ({}) must be greater than minimum ({})",
                self.max_value, self.min_value
            )));
        }
        if self.negative_filter > 0.0 {
            return Err(Error::InvalidConfig(format!(
                "negative filter must not be positive, got {}",
                self.negative_filter
            )));
        }
        Ok(())
    }
}

/// Maps a bounded number onto a quarter circle: `[sin θ, cos θ, 0]`.
///
/// The third dimension is a negative filter that carries the configured
/// sentinel for out-of-bounds inputs.
#[derive(Debug, Clone)]
pub struct NumberEmbedding {
    config: NumberEmbeddingConfig,
}

impl NumberEmbedding {
    pub fn new(config: NumberEmbeddingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn transform(&self, value: f64) -> f64 {
        match self.config.scale {
            NumberScale::Linear => value,
            NumberScale::Logarithmic => (1.0 + value).log(LOG_BASE),
        }
    }

    fn inverse_transform(&self, value: f64) -> f64 {
        let value = match self.config.scale {
            NumberScale::Linear => value,
            NumberScale::Logarithmic => LOG_BASE.powf(value) - 1.0,
        };
        (value * 1e10).round() / 1e10
    }

    fn out_of_bounds_values(&self) -> [f32; 3] {
        [0.0, 0.0, self.config.negative_filter]
    }

    fn is_out_of_bounds(&self, value: f64) -> bool {
        let below = value < self.config.min_value
            && matches!(self.config.mode, NumberMode::Maximum | NumberMode::Similar);
        let above = value > self.config.max_value
            && matches!(self.config.mode, NumberMode::Minimum | NumberMode::Similar);
        below || above
    }

    fn filtered(values: Vec<f32>) -> Result<Vector> {
        Vector::with_negative_filter(values, [FILTER_INDEX])
    }
}

#[async_trait]
impl Embedding for NumberEmbedding {
    fn length(&self) -> usize {
        NumberEmbeddingConfig::LENGTH
    }

    fn default_vector(&self) -> Vector {
        let values = match self.config.mode {
            NumberMode::Similar => vec![0.0, 0.0, 0.0],
            NumberMode::Minimum => vec![0.0, 1.0, 1.0],
            NumberMode::Maximum => vec![1.0, 0.0, 1.0],
        };
        Self::filtered(values).unwrap_or_else(|_| Vector::zeros(NumberEmbeddingConfig::LENGTH))
    }

    fn needs_inversion(&self) -> bool {
        true
    }

    fn inverse_embed(&self, vector: &Vector, _context: &ExecutionContext) -> Result<FieldValue> {
        if vector.dim() != self.length() {
            return Err(Error::DimensionMismatch {
                expected: self.length(),
                actual: vector.dim(),
            });
        }
        if vector.as_slice() == self.out_of_bounds_values() {
            let bias = (self.config.max_value - self.config.min_value) / 1000.0;
            let value = match self.config.mode {
                NumberMode::Maximum => self.config.min_value - bias,
                _ => self.config.max_value + bias,
            };
            return Ok(FieldValue::Float(value));
        }
        let values = vector.as_slice();
        let angle = (values[0] as f64).atan2(values[1] as f64);
        let min = self.transform(self.config.min_value);
        let max = self.transform(self.config.max_value);
        let transformed = angle / FRAC_PI_2 * (max - min) + min;
        Ok(FieldValue::Float(self.inverse_transform(transformed)))
    }

    async fn embed(&self, input: &FieldValue, context: &ExecutionContext) -> Result<Vector> {
        if context.is_query() && self.config.mode != NumberMode::Similar {
            return Ok(self.default_vector());
        }
        let value = number_input(input)?;
        if self.is_out_of_bounds(value) {
            return Self::filtered(self.out_of_bounds_values().to_vec());
        }
        let min = self.transform(self.config.min_value);
        let max = self.transform(self.config.max_value);
        let constrained = self.transform(value).clamp(min, max);
        let angle = (constrained - min) / (max - min) * FRAC_PI_2;
        Self::filtered(vec![angle.sin() as f32, angle.cos() as f32, 0.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EmbeddingRegistry;
    use std::sync::Arc;

    fn context() -> ExecutionContext {
        ExecutionContext::online(Arc::new(EmbeddingRegistry::new()))
    }

    fn embedding(mode: NumberMode) -> NumberEmbedding {
        NumberEmbedding::new(NumberEmbeddingConfig::new(0.0, 100.0, mode).with_negative_filter(-1.0)).unwrap()
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(NumberEmbedding::new(NumberEmbeddingConfig::new(5.0, 5.0, NumberMode::Similar)).is_err());
        assert!(NumberEmbedding::new(
            NumberEmbeddingConfig::new(-1.0, 5.0, NumberMode::Similar).with_scale(NumberScale::Logarithmic)
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_embed_endpoints() {
        let embedding = embedding(NumberMode::Similar);
        let min = embedding.embed(&FieldValue::Float(0.0), &context()).await.unwrap();
        assert!((min.as_slice()[0]).abs() < 1e-6);
        assert!((min.as_slice()[1] - 1.0).abs() < 1e-6);
        assert!(min.is_filtered(2));

        let max = embedding.embed(&FieldValue::Int(100), &context()).await.unwrap();
        assert!((max.as_slice()[0] - 1.0).abs() < 1e-6);
        assert!(max.as_slice()[1].abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_out_of_bounds_uses_negative_filter() {
        let embedding = embedding(NumberMode::Similar);
        let v = embedding.embed(&FieldValue::Float(150.0), &context()).await.unwrap();
        assert_eq!(v.as_slice(), &[0.0, 0.0, -1.0]);

        // a maximum-mode space clamps values above the range
        let clamped = self::embedding(NumberMode::Maximum)
            .embed(&FieldValue::Float(150.0), &context())
            .await
            .unwrap();
        assert!((clamped.as_slice()[0] - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_inverse_embed() {
        let embedding = embedding(NumberMode::Similar);
        let v = embedding.embed(&FieldValue::Float(30.0), &context()).await.unwrap();
        let restored = embedding.inverse_embed(&v, &context()).unwrap();
        assert!((restored.as_f64().unwrap() - 30.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_query_uses_default_for_directional_modes() {
        let query = context().to_query();
        let v = embedding(NumberMode::Maximum)
            .embed(&FieldValue::Float(10.0), &query)
            .await
            .unwrap();
        assert_eq!(v.as_slice(), &[1.0, 0.0, 1.0]);
    }
}
