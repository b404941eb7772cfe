// Comparison filters over typed record fields
use crate::field::FieldValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub trait Filter {
    fn matches(&self, fields: &HashMap<String, FieldValue>) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    In,
    NotIn,
    Contains,
}

/// `field <op> other`, evaluated against a record's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonOperation {
    pub field: String,
    pub op: ComparisonOp,
    pub other: Value,
}

impl ComparisonOperation {
    pub fn new(field: impl Into<String>, op: ComparisonOp, other: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            other: other.into(),
        }
    }

    pub fn equal(field: impl Into<String>, other: impl Into<Value>) -> Self {
        Self::new(field, ComparisonOp::Equal, other)
    }

    pub fn not_equal(field: impl Into<String>, other: impl Into<Value>) -> Self {
        Self::new(field, ComparisonOp::NotEqual, other)
    }

    pub fn greater_than(field: impl Into<String>, other: impl Into<Value>) -> Self {
        Self::new(field, ComparisonOp::GreaterThan, other)
    }

    pub fn less_than(field: impl Into<String>, other: impl Into<Value>) -> Self {
        Self::new(field, ComparisonOp::LessThan, other)
    }

    pub fn is_in(field: impl Into<String>, other: impl Into<Value>) -> Self {
        Self::new(field, ComparisonOp::In, other)
    }

    pub fn contains(field: impl Into<String>, other: impl Into<Value>) -> Self {
        Self::new(field, ComparisonOp::Contains, other)
    }

    pub fn evaluate(&self, fields: &HashMap<String, FieldValue>) -> bool {
        self.evaluate_value(fields.get(&self.field).map(FieldValue::to_json))
    }

    /// Evaluate against a stored JSON object.
    pub fn evaluate_json(&self, object: &Map<String, Value>) -> bool {
        self.evaluate_value(object.get(&self.field).cloned())
    }

    fn evaluate_value(&self, value: Option<Value>) -> bool {
        match self.op {
            ComparisonOp::Equal => value.map(|v| json_eq(&v, &self.other)).unwrap_or(false),
            ComparisonOp::NotEqual => value.map(|v| !json_eq(&v, &self.other)).unwrap_or(true),
            ComparisonOp::GreaterThan => self.compare_numbers(value, |a, b| a > b),
            ComparisonOp::GreaterEqual => self.compare_numbers(value, |a, b| a >= b),
            ComparisonOp::LessThan => self.compare_numbers(value, |a, b| a < b),
            ComparisonOp::LessEqual => self.compare_numbers(value, |a, b| a <= b),
            ComparisonOp::In => value.map(|v| is_in(&v, &self.other)).unwrap_or(false),
            ComparisonOp::NotIn => value.map(|v| !is_in(&v, &self.other)).unwrap_or(true),
            ComparisonOp::Contains => match value {
                Some(Value::String(s)) => self.other.as_str().map(|o| s.contains(o)).unwrap_or(false),
                Some(Value::Array(items)) => items.iter().any(|item| json_eq(item, &self.other)),
                _ => false,
            },
        }
    }

    fn compare_numbers(&self, value: Option<Value>, cmp: impl Fn(f64, f64) -> bool) -> bool {
        match (value.as_ref().and_then(Value::as_f64), self.other.as_f64()) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    }
}

impl Filter for ComparisonOperation {
    fn matches(&self, fields: &HashMap<String, FieldValue>) -> bool {
        self.evaluate(fields)
    }
}

impl Filter for [ComparisonOperation] {
    fn matches(&self, fields: &HashMap<String, FieldValue>) -> bool {
        self.iter().all(|op| op.evaluate(fields))
    }
}

// ints and floats compare by value
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn is_in(value: &Value, other: &Value) -> bool {
    let Some(candidates) = other.as_array() else {
        return json_eq(value, other);
    };
    match value {
        Value::Array(items) => items.iter().any(|item| candidates.iter().any(|c| json_eq(item, c))),
        _ => candidates.iter().any(|c| json_eq(value, c)),
    }
}
