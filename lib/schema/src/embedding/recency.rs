use super::{number_input, Embedding};
use crate::context::ExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spacefold_core::{Error, FieldValue, Result, Vector};
use std::f64::consts::FRAC_PI_2;

const SECONDS_PER_DAY: i64 = 86_400;

fn default_period_weight() -> f32 {
    1.0
}

/// A recency window and the weight of its contribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodTime {
    pub period_secs: i64,
    #[serde(default = "default_period_weight")]
    pub weight: f32,
}

impl PeriodTime {
    pub fn new(period_secs: i64, weight: f32) -> Self {
        Self { period_secs, weight }
    }

    pub fn days(days: i64) -> Self {
        Self::new(days * SECONDS_PER_DAY, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecencyEmbeddingConfig {
    pub period_times: Vec<PeriodTime>,
    /// Shift of the daily window boundary, below one day
    #[serde(default)]
    pub hour_offset_secs: i64,
    #[serde(default)]
    pub negative_filter: f32,
}

impl RecencyEmbeddingConfig {
    pub fn new(period_times: Vec<PeriodTime>) -> Self {
        Self {
            period_times,
            hour_offset_secs: 0,
            negative_filter: 0.0,
        }
    }

    #[must_use]
    pub fn with_negative_filter(mut self, negative_filter: f32) -> Self {
        self.negative_filter = negative_filter;
        self
    }

    /// Two dimensions per period plus the trailing negative-filter dimension
    pub fn length(&self) -> usize {
        self.period_times.len() * 2 + 1
    }
}

/// Encodes a timestamp as its position inside each recency window.
///
/// Windows end at the next day boundary after "now". Inside a window the
/// elapsed fraction `f` maps to `[cos(f·π/2), sin(f·π/2)] * weight`; outside
/// it maps to zeros. The last dimension belongs to the longest window:
/// `0` inside, the negative filter outside, `1` for queries.
#[derive(Debug, Clone)]
pub struct RecencyEmbedding {
    config: RecencyEmbeddingConfig,
    periods: Vec<PeriodTime>,
}

impl RecencyEmbedding {
    pub fn new(config: RecencyEmbeddingConfig) -> Result<Self> {
        if config.period_times.is_empty() {
            return Err(Error::InvalidConfig("recency embedding needs at least one period".to_string()));
        }
        if config.period_times.iter().any(|p| p.period_secs <= 0) {
            return Err(Error::InvalidConfig("recency periods must be positive".to_string()));
        }
        if !(0..SECONDS_PER_DAY).contains(&config.hour_offset_secs) {
            return Err(Error::InvalidConfig("hour offset must be less than a day".to_string()));
        }
        if config.period_times.iter().any(|p| p.weight < 0.0) {
            tracing::warn!("negative recency period weight, scores may not decrease monotonically with age");
        }
        let mut periods = config.period_times.clone();
        periods.sort_by_key(|p| p.period_secs);
        Ok(Self { config, periods })
    }

    fn window_end(&self, now: i64) -> i64 {
        now - now.rem_euclid(SECONDS_PER_DAY) + SECONDS_PER_DAY + self.config.hour_offset_secs
    }

    fn window_start(&self, period: &PeriodTime, now: i64) -> i64 {
        self.window_end(now) - period.period_secs
    }

    fn filter_index(&self) -> usize {
        self.length() - 1
    }
}

#[async_trait]
impl Embedding for RecencyEmbedding {
    fn length(&self) -> usize {
        self.config.length()
    }

    fn default_vector(&self) -> Vector {
        let length = self.length();
        Vector::with_negative_filter(vec![0.0; length], [self.filter_index() as i64])
            .unwrap_or_else(|_| Vector::zeros(length))
    }

    fn needs_inversion(&self) -> bool {
        true
    }

    fn inverse_embed(&self, vector: &Vector, context: &ExecutionContext) -> Result<FieldValue> {
        if vector.dim() != self.length() {
            return Err(Error::DimensionMismatch {
                expected: self.length(),
                actual: vector.dim(),
            });
        }
        let values = vector.as_slice();
        let (x, y) = (values[values.len() - 3] as f64, values[values.len() - 2] as f64);
        let longest = self.periods[self.periods.len() - 1];
        let start = self.window_start(&longest, context.now());
        let end = self.window_end(context.now());
        if x == 0.0 && y == 0.0 {
            return Ok(FieldValue::Timestamp(start - 1));
        }
        let fraction = y.atan2(x) / FRAC_PI_2;
        let elapsed = (fraction * (end - start) as f64).round() as i64;
        Ok(FieldValue::Timestamp(start + elapsed))
    }

    async fn embed(&self, input: &FieldValue, context: &ExecutionContext) -> Result<Vector> {
        let created_at = number_input(input)?.round() as i64;
        let now = context.now();
        let end = self.window_end(now);
        let mut data = Vec::with_capacity(self.length());
        for (i, period) in self.periods.iter().enumerate() {
            let start = self.window_start(period, now);
            let in_scope = (start..=end).contains(&created_at);
            if in_scope {
                let fraction = (created_at - start) as f64 / (end - start) as f64;
                let angle = fraction * FRAC_PI_2;
                data.push((angle.cos() as f32) * period.weight);
                data.push((angle.sin() as f32) * period.weight);
            } else {
                data.extend([0.0, 0.0]);
            }
            if i == self.periods.len() - 1 {
                data.push(if context.is_query() {
                    1.0
                } else if in_scope {
                    0.0
                } else {
                    self.config.negative_filter
                });
            }
        }
        Vector::with_negative_filter(data, [self.filter_index() as i64])
    }
}
