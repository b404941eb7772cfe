use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Float,
    Int,
    /// Unix seconds
    Timestamp,
    StringList,
    FloatList,
    /// Opaque payload (URL, path or encoded bytes) handed to an embedding engine
    Blob,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Float => "float",
            FieldType::Int => "int",
            FieldType::Timestamp => "timestamp",
            FieldType::StringList => "string_list",
            FieldType::FloatList => "float_list",
            FieldType::Blob => "blob",
        };
        f.write_str(name)
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Float(f64),
    Int(i64),
    Timestamp(i64),
    StringList(Vec<String>),
    FloatList(Vec<f32>),
    Blob(String),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::String(_) => FieldType::String,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Timestamp(_) => FieldType::Timestamp,
            FieldValue::StringList(_) => FieldType::StringList,
            FieldValue::FloatList(_) => FieldType::FloatList,
            FieldValue::Blob(_) => FieldType::Blob,
        }
    }

    /// Parse a JSON value as `field_type`.
    ///
    /// A bare string is accepted for a string list.
    pub fn from_json(field_type: FieldType, value: &Value) -> Result<FieldValue> {
        let parsed = match field_type {
            FieldType::String => value.as_str().map(|s| FieldValue::String(s.to_string())),
            FieldType::Blob => value.as_str().map(|s| FieldValue::Blob(s.to_string())),
            FieldType::Float => value.as_f64().map(FieldValue::Float),
            FieldType::Int => value.as_i64().map(FieldValue::Int),
            FieldType::Timestamp => value.as_i64().map(FieldValue::Timestamp),
            FieldType::StringList => match value {
                Value::String(s) => Some(FieldValue::StringList(vec![s.clone()])),
                Value::Array(items) => items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .map(FieldValue::StringList),
                _ => None,
            },
            FieldType::FloatList => value.as_array().and_then(|items| {
                items
                    .iter()
                    .map(|item| item.as_f64().map(|x| x as f32))
                    .collect::<Option<Vec<_>>>()
                    .map(FieldValue::FloatList)
            }),
        };
        parsed.ok_or_else(|| Error::InvalidInput(format!("expected {}, got {}", field_type, value)))
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) | FieldValue::Blob(s) => Value::from(s.as_str()),
            FieldValue::Float(x) => Value::from(*x),
            FieldValue::Int(x) | FieldValue::Timestamp(x) => Value::from(*x),
            FieldValue::StringList(items) => Value::from(items.clone()),
            FieldValue::FloatList(items) => Value::from(items.clone()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(x) => Some(*x),
            FieldValue::Int(x) | FieldValue::Timestamp(x) => Some(*x as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::Blob(s) => Some(s),
            _ => None,
        }
    }
}
