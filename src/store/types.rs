use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// A document as the store sees it: a JSON object, `_id`-keyed.
pub type Document = serde_json::Value;

/// A scalar key value of the split field.
///
/// Carries the total order that range scans and split boundaries rely on:
/// numbers compare across integer/float representation and sort before
/// strings. Non-scalar field values never become keys; a document whose
/// split field is missing or non-scalar is invisible to range scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl KeyValue {
    /// Extracts a key from a JSON value, if it is a supported scalar.
    pub fn from_json(value: &serde_json::Value) -> Option<KeyValue> {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(KeyValue::Int(i))
                } else {
                    n.as_f64().map(KeyValue::Float)
                }
            }
            serde_json::Value::String(s) => Some(KeyValue::Str(s.clone())),
            _ => None,
        }
    }

    /// Extracts the key of `field` from a document.
    pub fn of_field(doc: &Document, field: &str) -> Option<KeyValue> {
        doc.get(field).and_then(KeyValue::from_json)
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Str(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Str(v)
    }
}

impl From<KeyValue> for serde_json::Value {
    fn from(v: KeyValue) -> Self {
        match v {
            KeyValue::Int(i) => serde_json::Value::from(i),
            KeyValue::Float(f) => serde_json::Value::from(f),
            KeyValue::Str(s) => serde_json::Value::from(s),
        }
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use KeyValue::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            (Int(_) | Float(_), Str(_)) => Ordering::Less,
            (Str(_), Int(_) | Float(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

/// A half-open key range `[lower, upper)`. A missing bound means the range
/// is unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub lower: Option<KeyValue>,
    pub upper: Option<KeyValue>,
}

impl Range {
    pub fn new(lower: Option<KeyValue>, upper: Option<KeyValue>) -> Self {
        Self { lower, upper }
    }

    /// The range covering the whole key space.
    pub fn unbounded() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }

    pub fn contains(&self, key: &KeyValue) -> bool {
        let above_lower = match &self.lower {
            Some(lower) => key >= lower,
            None => true,
        };
        let below_upper = match &self.upper {
            Some(upper) => key < upper,
            None => true,
        };
        above_lower && below_upper
    }
}

/// A conjunction of field equalities, the only filter shape the
/// coordination core needs.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<(String, serde_json::Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<serde_json::Value>) -> Self {
        self.clauses.push((field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }
}

/// A list of field assignments applied to a matched document.
#[derive(Debug, Clone, Default)]
pub struct Update {
    sets: Vec<(String, serde_json::Value)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<serde_json::Value>) -> Self {
        self.sets.push((field.to_string(), value.into()));
        self
    }

    pub fn apply(&self, doc: &mut Document) {
        if let Some(obj) = doc.as_object_mut() {
            for (field, value) in &self.sets {
                obj.insert(field.clone(), value.clone());
            }
        }
    }
}

/// Result of the store's collection-statistics command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub count: u64,
    pub avg_obj_size: u64,
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint was violated. The bootstrap path relies on
    /// telling this apart from every other failure.
    #[error("duplicate key in collection '{collection}'")]
    DuplicateKey { collection: String },

    /// A store command (stats, split vector) failed.
    #[error("store command failed: {0}")]
    CommandFailed(String),

    /// The store was unreachable or the operation was cut short. Fatal to
    /// the worker that sees it; peers recover its state.
    #[error("store i/o error: {0}")]
    Io(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
