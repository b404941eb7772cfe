use serde::{Deserialize, Serialize};
use spacefold_core::{EntityId, FieldValue};
use std::collections::HashMap;
use std::sync::Arc;

/// A parsed entity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub schema: String,
    pub id: String,
    pub fields: HashMap<String, FieldValue>,
}

impl Record {
    pub fn new(schema: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            id: id.into(),
            fields: HashMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn entity_id(&self) -> EntityId {
        EntityId::new(self.schema.clone(), self.id.clone())
    }
}

/// A parsed event: who affected whom, when, and with which attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub schema: String,
    pub id: String,
    /// Unix seconds
    pub created_at: i64,
    pub fields: HashMap<String, FieldValue>,
    /// Reference field name to referenced object id
    pub references: HashMap<String, String>,
}

impl EventRecord {
    /// New event with a generated id.
    pub fn new(schema: impl Into<String>, created_at: i64) -> Self {
        Self {
            schema: schema.into(),
            id: uuid::Uuid::new_v4().to_string(),
            created_at,
            fields: HashMap::new(),
            references: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_reference(mut self, field: impl Into<String>, object_id: impl Into<String>) -> Self {
        self.references.insert(field.into(), object_id.into());
        self
    }

    pub fn reference(&self, field: &str) -> Option<&str> {
        self.references.get(field).map(String::as_str)
    }

    pub fn entity_id(&self) -> EntityId {
        EntityId::new(self.schema.clone(), self.id.clone())
    }
}

/// One row of an evaluation batch: an entity, the fields that changed and
/// the event that touched it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpdate {
    pub entity: EntityId,
    pub fields: HashMap<String, FieldValue>,
    pub event: Option<Arc<EventRecord>>,
}

impl EntityUpdate {
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            fields: HashMap::new(),
            event: None,
        }
    }

    pub fn from_record(record: &Record) -> Self {
        Self {
            entity: record.entity_id(),
            fields: record.fields.clone(),
            event: None,
        }
    }

    pub fn for_event(entity: EntityId, event: Arc<EventRecord>) -> Self {
        Self {
            entity,
            fields: HashMap::new(),
            event: Some(event),
        }
    }
}
