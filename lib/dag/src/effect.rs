//! Effects: events of one schema moving another entity's vector in a space.

use serde::{Deserialize, Serialize};
use spacefold_core::{ComparisonOperation, Error, Result};

fn default_temperature() -> f32 {
    0.5
}

fn default_event_influence() -> f32 {
    0.5
}

fn default_time_decay_floor() -> f32 {
    1.0
}

/// Event aggregation settings shared by every effect of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Share of a new event against the stored aggregate
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Share of event aggregates against the entity's own vector
    #[serde(default = "default_event_influence")]
    pub event_influence: f32,
    /// Lowest weight time decay can push the stored aggregate to
    #[serde(default = "default_time_decay_floor")]
    pub time_decay_floor: f32,
    /// Seconds; older events contribute nothing
    #[serde(default)]
    pub max_age: Option<i64>,
    /// Only used when recomputing from history
    #[serde(default)]
    pub max_count: Option<usize>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            event_influence: default_event_influence(),
            time_decay_floor: default_time_decay_floor(),
            max_age: None,
            max_count: None,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("temperature", self.temperature),
            ("event_influence", self.event_influence),
            ("time_decay_floor", self.time_decay_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }
        if matches!(self.max_age, Some(age) if age < 0) {
            return Err(Error::InvalidConfig("max_age must not be negative".to_string()));
        }
        if self.max_count == Some(0) {
            return Err(Error::InvalidConfig("max_count must be positive".to_string()));
        }
        Ok(())
    }
}

/// A schema reached through a reference field of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaReference {
    pub schema: String,
    pub reference_field: String,
}

impl SchemaReference {
    pub fn new(schema: impl Into<String>, reference_field: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            reference_field: reference_field.into(),
        }
    }
}

/// When an event of `event_schema` matches `filter`, the `affecting`
/// entity's vector in `space` pulls the `affected` entity's vector towards
/// it, scaled by `multiplier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub space: String,
    pub event_schema: String,
    pub affected: SchemaReference,
    pub affecting: SchemaReference,
    #[serde(default)]
    pub filter: Option<ComparisonOperation>,
    #[serde(default = "default_multiplier")]
    pub multiplier: f32,
}

fn default_multiplier() -> f32 {
    1.0
}

impl Effect {
    pub fn new(
        space: impl Into<String>,
        event_schema: impl Into<String>,
        affected: SchemaReference,
        affecting: SchemaReference,
    ) -> Self {
        Self {
            space: space.into(),
            event_schema: event_schema.into(),
            affected,
            affecting,
            filter: None,
            multiplier: default_multiplier(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: ComparisonOperation) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Effects with the same key are folded into one event-aggregation node.
    pub(crate) fn group_key(&self) -> EffectGroupKey {
        EffectGroupKey {
            space: self.space.clone(),
            event_schema: self.event_schema.clone(),
            affected: self.affected.clone(),
            affecting: self.affecting.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct EffectGroupKey {
    pub space: String,
    pub event_schema: String,
    pub affected: SchemaReference,
    pub affecting: SchemaReference,
}
