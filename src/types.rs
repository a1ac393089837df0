//! Core identifiers and attribute values shared across contexts and stores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a context, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    /// Generate the next context ID
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ContextId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Identity of a managed object.
///
/// Objects inserted into a context start with a temporary identity. The store
/// coordinator replaces it with a permanent one, either on request
/// (`obtain_permanent_ids`) or when the insert is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectId {
    Temporary(u64),
    Permanent(u64),
}

impl ObjectId {
    /// Allocate a fresh temporary identity
    pub fn temporary() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ObjectId::Temporary(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, ObjectId::Temporary(_))
    }

    /// Key bytes used by stores; only meaningful for permanent identities.
    pub fn permanent_key(&self) -> Option<[u8; 8]> {
        match self {
            ObjectId::Permanent(raw) => Some(raw.to_be_bytes()),
            ObjectId::Temporary(_) => None,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Temporary(raw) => write!(f, "t{}", raw),
            ObjectId::Permanent(raw) => write!(f, "p{}", raw),
        }
    }
}

impl FromStr for ObjectId {
    type Err = String;

    /// Accepts `p12`, `t3`, or a bare number (permanent).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (make, digits): (fn(u64) -> ObjectId, &str) = match raw.as_bytes().first() {
            Some(b'p') => (ObjectId::Permanent, &raw[1..]),
            Some(b't') => (ObjectId::Temporary, &raw[1..]),
            _ => (ObjectId::Permanent, raw),
        };
        digits
            .parse::<u64>()
            .map(make)
            .map_err(|_| format!("invalid object id: {:?}", raw))
    }
}

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Parse a command-line literal: `null`, `true`/`false`, integers, floats,
    /// otherwise text.
    pub fn parse_literal(raw: &str) -> Self {
        match raw {
            "null" => return AttributeValue::Null,
            "true" => return AttributeValue::Bool(true),
            "false" => return AttributeValue::Bool(false),
            _ => {}
        }
        if let Ok(int) = raw.parse::<i64>() {
            return AttributeValue::Int(int);
        }
        if let Ok(float) = raw.parse::<f64>() {
            return AttributeValue::Float(float);
        }
        AttributeValue::Text(raw.to_string())
    }

    /// Plain JSON rendering (no variant tags), for display.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Null => serde_json::Value::Null,
            AttributeValue::Bool(value) => serde_json::Value::Bool(*value),
            AttributeValue::Int(value) => serde_json::Value::from(*value),
            AttributeValue::Float(value) => serde_json::Value::from(*value),
            AttributeValue::Text(value) => serde_json::Value::String(value.clone()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

/// Property name -> value, ordered for deterministic encoding.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Point-in-time copy of an object's values as seen by one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub id: ObjectId,
    pub entity: String,
    pub attributes: Attributes,
    /// Store version the values are based on (0 for never-persisted objects)
    pub version: u64,
}

impl ObjectSnapshot {
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}
