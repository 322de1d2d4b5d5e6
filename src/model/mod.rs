//! Keyed record model
//!
//! A [`Record`] is an insertion-ordered tree of named fields holding scalars,
//! nested records, or arrays of records. Field paths are dot-delimited and a
//! path step into an array of objects fans out over every element.

pub mod collection;
pub mod key;

pub use collection::ReleaseCollection;
pub use key::{JoinKey, KeyExtractor, KeyFields};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Separator between the segments of a field path
pub const PATH_SEPARATOR: char = '.';

/// Canonical nested record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Build a record from a JSON value; `None` unless the value is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Top-level field names in insertion order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Resolve a dot path through nested objects. Arrays are not traversed;
    /// use [`Record::values_at`] for fan-out.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split(PATH_SEPARATOR);
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Textual value of a scalar field. Strings are returned as-is, numbers
    /// and booleans are rendered; null and containers yield `None`.
    pub fn text(&self, path: &str) -> Option<String> {
        self.get(path).and_then(scalar_text)
    }

    /// All values at `path`, fanning out over arrays of objects
    pub fn values_at(&self, path: &str) -> Vec<&Value> {
        let mut current: Vec<&Value> = Vec::new();
        let mut segments = path.split(PATH_SEPARATOR);
        let Some(first) = segments.next() else {
            return current;
        };
        if let Some(value) = self.0.get(first) {
            current.push(value);
        }
        for segment in segments {
            current = current
                .into_iter()
                .flat_map(|value| match value {
                    Value::Array(items) => items.iter().collect::<Vec<_>>(),
                    other => vec![other],
                })
                .filter_map(|value| value.as_object().and_then(|object| object.get(segment)))
                .collect();
        }
        current
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Consuming insert for building records
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.0.get_mut(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.shift_remove(field)
    }

    /// Array field as a slice; empty when absent or not an array
    pub fn array(&self, field: &str) -> &[Value] {
        self.0
            .get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every path that ends in a scalar, an array of scalars, or an empty
    /// container. Paths through arrays of objects are the union over elements.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_leaf_paths(&self.0, "", &mut paths);
        paths
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Render a scalar the way join keys and ids compare it
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn collect_leaf_paths(map: &Map<String, Value>, prefix: &str, paths: &mut Vec<String>) {
    for (field, value) in map {
        let path = if prefix.is_empty() {
            field.clone()
        } else {
            format!("{prefix}{PATH_SEPARATOR}{field}")
        };
        match value {
            Value::Object(nested) if !nested.is_empty() => {
                collect_leaf_paths(nested, &path, paths);
            }
            Value::Array(items) if items.iter().any(Value::is_object) => {
                let mut element_paths = Vec::new();
                let mut empty_element = false;
                for item in items {
                    match item {
                        Value::Object(nested) if nested.is_empty() => empty_element = true,
                        Value::Object(nested) => collect_leaf_paths(nested, &path, &mut element_paths),
                        _ => {}
                    }
                }
                // an empty element is a leaf at the array itself
                if empty_element || element_paths.is_empty() {
                    element_paths.push(path);
                }
                for element_path in element_paths {
                    if !paths.contains(&element_path) {
                        paths.push(element_path);
                    }
                }
            }
            _ => paths.push(path),
        }
    }
}
