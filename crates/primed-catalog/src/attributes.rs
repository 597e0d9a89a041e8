//! Configuration attributes exposed by dataset descriptors.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

/// Ordered `(field_name, value)` sequence describing a descriptor's configuration.
pub type Attributes = Vec<(String, AttributeValue)>;

/// A single configuration value of a dataset descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Path(PathBuf),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
    /// Attributes of a descriptor wrapped by another descriptor.
    Nested(Attributes),
    Null,
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            AttributeValue::Path(p) => p.to_str(),
            _ => None,
        }
    }

    /// Convert a JSON value into an attribute value.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Integer(i),
                None => AttributeValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => AttributeValue::String(s.clone()),
            Value::Array(items) => {
                AttributeValue::List(items.iter().map(AttributeValue::from_json).collect())
            }
            Value::Object(map) => AttributeValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), AttributeValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back into JSON. Paths become strings, nested descriptors objects.
    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::String(s) => Value::String(s.clone()),
            AttributeValue::Path(p) => Value::String(p.to_string_lossy().into_owned()),
            AttributeValue::Integer(i) => Value::from(*i),
            AttributeValue::Float(f) => Value::from(*f),
            AttributeValue::Boolean(b) => Value::Bool(*b),
            AttributeValue::List(items) => {
                Value::Array(items.iter().map(AttributeValue::to_json).collect())
            }
            AttributeValue::Map(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            AttributeValue::Nested(attrs) => Value::Object(
                attrs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            AttributeValue::Null => Value::Null,
        }
    }
}

/// Look up a field by name.
pub fn find<'a>(attributes: &'a [(String, AttributeValue)], key: &str) -> Option<&'a AttributeValue> {
    attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}
