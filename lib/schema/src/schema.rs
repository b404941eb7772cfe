//! Schema definitions
//!
//! A schema names a record type and declares its typed fields. Entity
//! schemas describe indexable objects; event schemas describe time-stamped
//! interactions that reference entities through reference fields.

use crate::record::{EventRecord, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spacefold_core::{Error, FieldType, FieldValue, Result};
use std::collections::{BTreeMap, HashMap};

/// Name of the timestamp every event carries.
pub const CREATED_AT_FIELD: &str = "created_at";

fn default_id_field() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Entity,
    Event,
}

/// A declared field of a schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaField {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub name: String,

    pub kind: SchemaKind,

    #[serde(default = "default_id_field")]
    pub id_field: String,

    #[serde(default)]
    pub fields: BTreeMap<String, SchemaField>,

    /// Event reference fields, keyed by field name, valued by target schema
    #[serde(default)]
    pub references: BTreeMap<String, String>,
}

impl Schema {
    pub fn entity(name: impl Into<String>) -> Self {
        Self::with_kind(name, SchemaKind::Entity)
    }

    pub fn event(name: impl Into<String>) -> Self {
        Self::with_kind(name, SchemaKind::Event)
    }

    fn with_kind(name: impl Into<String>, kind: SchemaKind) -> Self {
        Self {
            name: name.into(),
            kind,
            id_field: default_id_field(),
            fields: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(
            name.into(),
            SchemaField {
                field_type,
                nullable: false,
            },
        );
        self
    }

    #[must_use]
    pub fn nullable_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(
            name.into(),
            SchemaField {
                field_type,
                nullable: true,
            },
        );
        self
    }

    #[must_use]
    pub fn reference(mut self, name: impl Into<String>, target_schema: impl Into<String>) -> Self {
        self.references.insert(name.into(), target_schema.into());
        self
    }

    #[must_use]
    pub fn with_id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field = name.into();
        self
    }

    pub fn is_event(&self) -> bool {
        self.kind == SchemaKind::Event
    }

    pub fn get_field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.get(name)
    }

    /// Target schema of an event reference field
    pub fn reference_target(&self, name: &str) -> Option<&str> {
        self.references.get(name).map(String::as_str)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidConfig("schema name cannot be empty".to_string()));
        }
        match self.kind {
            SchemaKind::Entity if !self.references.is_empty() => {
                return Err(Error::InvalidConfig(format!(
                    "entity schema '{}' cannot declare references",
                    self.name
                )));
            }
            SchemaKind::Event if self.references.is_empty() => {
                return Err(Error::InvalidConfig(format!(
                    "event schema '{}' must reference at least one schema",
                    self.name
                )));
            }
            _ => {}
        }
        for name in self.fields.keys() {
            if *name == self.id_field
                || self.references.contains_key(name)
                || (self.is_event() && name == CREATED_AT_FIELD)
            {
                return Err(Error::InvalidConfig(format!(
                    "field '{}' of schema '{}' shadows a reserved field",
                    name, self.name
                )));
            }
        }
        Ok(())
    }

    /// Parse a JSON object into a record of this entity schema.
    pub fn parse_record(&self, json: &Value) -> Result<Record> {
        if self.is_event() {
            return Err(Error::InvalidInput(format!(
                "'{}' is an event schema, use parse_event",
                self.name
            )));
        }
        let object = self.as_object(json)?;
        let id = self.parse_id(object)?.ok_or_else(|| {
            Error::InvalidInput(format!("record of '{}' is missing '{}'", self.name, self.id_field))
        })?;
        let fields = self.parse_fields(object, |key| key == self.id_field)?;
        Ok(Record {
            schema: self.name.clone(),
            id,
            fields,
        })
    }

    /// Parse a JSON object into an event of this event schema.
    ///
    /// A missing id is generated.
    pub fn parse_event(&self, json: &Value) -> Result<EventRecord> {
        if !self.is_event() {
            return Err(Error::InvalidInput(format!("'{}' is not an event schema", self.name)));
        }
        let object = self.as_object(json)?;
        let created_at = object
            .get(CREATED_AT_FIELD)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                Error::InvalidInput(format!("event of '{}' needs an integer '{}'", self.name, CREATED_AT_FIELD))
            })?;

        let mut event = EventRecord::new(self.name.clone(), created_at);
        if let Some(id) = self.parse_id(object)? {
            event.id = id;
        }
        for name in self.references.keys() {
            let target = object
                .get(name)
                .and_then(id_to_string)
                .ok_or_else(|| Error::InvalidInput(format!("event of '{}' is missing reference '{}'", self.name, name)))?;
            event.references.insert(name.clone(), target);
        }
        event.fields = self.parse_fields(object, |key| {
            key == self.id_field || key == CREATED_AT_FIELD || self.references.contains_key(key)
        })?;
        Ok(event)
    }

    fn as_object<'a>(&self, json: &'a Value) -> Result<&'a serde_json::Map<String, Value>> {
        json.as_object()
            .ok_or_else(|| Error::InvalidInput(format!("record of '{}' must be a JSON object", self.name)))
    }

    fn parse_id(&self, object: &serde_json::Map<String, Value>) -> Result<Option<String>> {
        match object.get(&self.id_field) {
            None => Ok(None),
            Some(value) => id_to_string(value)
                .map(Some)
                .ok_or_else(|| Error::InvalidInput(format!("'{}' must be a string or an integer", self.id_field))),
        }
    }

    fn parse_fields(
        &self,
        object: &serde_json::Map<String, Value>,
        is_reserved: impl Fn(&str) -> bool,
    ) -> Result<HashMap<String, FieldValue>> {
        let mut fields = HashMap::new();
        for (key, value) in object {
            if is_reserved(key) {
                continue;
            }
            let field = self
                .get_field(key)
                .ok_or_else(|| Error::InvalidInput(format!("unknown field '{}' for schema '{}'", key, self.name)))?;
            if value.is_null() {
                if field.nullable {
                    continue;
                }
                return Err(Error::InvalidInput(format!("field '{}' is not nullable", key)));
            }
            fields.insert(key.clone(), FieldValue::from_json(field.field_type, value)?);
        }
        for (name, field) in &self.fields {
            if !field.nullable && !fields.contains_key(name) {
                return Err(Error::InvalidInput(format!(
                    "missing non-nullable field '{}' for schema '{}'",
                    name, self.name
                )));
            }
        }
        Ok(fields)
    }
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n.as_i64().map(|n| n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paragraph() -> Schema {
        Schema::entity("paragraph")
            .field("body", FieldType::String)
            .nullable_field("likes", FieldType::Int)
    }

    fn interaction() -> Schema {
        Schema::event("interaction")
            .reference("user", "user")
            .reference("paragraph", "paragraph")
            .field("type", FieldType::String)
    }

    #[test]
    fn test_validate() {
        assert!(paragraph().validate().is_ok());
        assert!(interaction().validate().is_ok());
        assert!(Schema::event("bare").validate().is_err());
        assert!(Schema::entity("p").reference("x", "y").validate().is_err());
        assert!(Schema::entity("p").field("id", FieldType::String).validate().is_err());
    }

    #[test]
    fn test_parse_record() {
        let record = paragraph()
            .parse_record(&json!({"id": 7, "body": "hello", "likes": null}))
            .unwrap();
        assert_eq!(record.id, "7");
        assert_eq!(record.fields.get("body"), Some(&FieldValue::String("hello".to_string())));
        assert!(!record.fields.contains_key("likes"));

        assert!(paragraph().parse_record(&json!({"id": "1"})).is_err());
        assert!(paragraph().parse_record(&json!({"id": "1", "body": "x", "extra": 1})).is_err());
        assert!(paragraph().parse_record(&json!({"body": "x"})).is_err());
    }

    #[test]
    fn test_parse_event() {
        let event = interaction()
            .parse_event(&json!({
                "user": "u1",
                "paragraph": "p1",
                "type": "like",
                "created_at": 1_700_000_000,
            }))
            .unwrap();
        assert_eq!(event.created_at, 1_700_000_000);
        assert_eq!(event.reference("user"), Some("u1"));
        assert!(!event.id.is_empty());

        let missing_reference = json!({"user": "u1", "type": "like", "created_at": 1});
        assert!(interaction().parse_event(&missing_reference).is_err());
        assert!(paragraph().parse_event(&json!({"created_at": 1})).is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let schema = interaction();
        let json = serde_json::to_string(&schema).unwrap();
        let parsed: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, parsed);
    }
}
