//! Field projection over nested records
//!
//! Paths are compiled once into a trie. A path step that meets an array of
//! objects applies to every element. Containers emptied by a projection are
//! omitted; containers that were already empty are left alone.

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::fields::CollectionFields;
use crate::model::{Record, PATH_SEPARATOR};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PathTrie {
    terminal: bool,
    children: HashMap<String, PathTrie>,
}

impl PathTrie {
    fn build<'a>(paths: impl IntoIterator<Item = &'a String>) -> Self {
        let mut root = PathTrie::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.split(PATH_SEPARATOR) {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.terminal = true;
        }
        root
    }
}

/// A compiled projection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldProjection {
    #[default]
    Identity,
    Include(PathTrieHandle),
    Exclude(PathTrieHandle),
}

/// Opaque compiled path set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTrieHandle(PathTrie);

impl FieldProjection {
    /// Compile validated collection fields. Include wins if both lists are
    /// set; registry validation rejects that case before compilation.
    pub fn compile(fields: &CollectionFields) -> Self {
        if !fields.included.is_empty() {
            Self::Include(PathTrieHandle(PathTrie::build(&fields.included)))
        } else if !fields.excluded.is_empty() {
            Self::Exclude(PathTrieHandle(PathTrie::build(&fields.excluded)))
        } else {
            Self::Identity
        }
    }

    pub fn project(&self, record: &Record) -> Record {
        match self {
            Self::Identity => record.clone(),
            Self::Include(PathTrieHandle(trie)) => {
                Record::from_map(include_map(record.as_map(), trie))
            }
            Self::Exclude(PathTrieHandle(trie)) => {
                Record::from_map(exclude_map(record.as_map(), trie))
            }
        }
    }
}

/// Project `record` with optional field lists; no lists means identity
pub fn project(record: &Record, fields: Option<&CollectionFields>) -> Record {
    match fields {
        Some(fields) => FieldProjection::compile(fields).project(record),
        None => record.clone(),
    }
}

fn include_map(map: &Map<String, Value>, node: &PathTrie) -> Map<String, Value> {
    let mut projected = Map::new();
    for (field, value) in map {
        let Some(child) = node.children.get(field) else {
            continue;
        };
        if child.terminal {
            projected.insert(field.clone(), value.clone());
        } else if let Some(value) = include_value(value, child) {
            projected.insert(field.clone(), value);
        }
    }
    projected
}

fn include_value(value: &Value, node: &PathTrie) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let projected = include_map(map, node);
            (!projected.is_empty()).then_some(Value::Object(projected))
        }
        Value::Array(items) => {
            let projected: Vec<Value> = items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(map) if map.is_empty() => Some(item.clone()),
                    Value::Object(map) => {
                        let projected = include_map(map, node);
                        (!projected.is_empty()).then_some(Value::Object(projected))
                    }
                    _ => None,
                })
                .collect();
            (!projected.is_empty()).then_some(Value::Array(projected))
        }
        _ => None,
    }
}

fn exclude_map(map: &Map<String, Value>, node: &PathTrie) -> Map<String, Value> {
    let mut projected = Map::new();
    for (field, value) in map {
        match node.children.get(field) {
            None => {
                projected.insert(field.clone(), value.clone());
            }
            Some(child) if child.terminal => {}
            Some(child) => {
                if let Some(value) = exclude_value(value, child) {
                    projected.insert(field.clone(), value);
                }
            }
        }
    }
    projected
}

fn exclude_value(value: &Value, node: &PathTrie) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let projected = exclude_map(map, node);
            (map.is_empty() || !projected.is_empty()).then_some(Value::Object(projected))
        }
        Value::Array(items) => {
            let projected: Vec<Value> = items
                .iter()
                .filter_map(|item| exclude_value(item, node))
                .collect();
            (items.is_empty() || !projected.is_empty()).then_some(Value::Array(projected))
        }
        other => Some(other.clone()),
    }
}
