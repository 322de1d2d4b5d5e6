//! Field-level merge of records sharing a join key
//!
//! Scalars resolve first-non-null-wins in source order, arrays concatenate,
//! objects concatenate by key union (shared keys merge recursively). Declared
//! combine fields must agree across every contributor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ReleaseError, ReleaseResult};
use crate::model::{scalar_text, JoinKey, KeyExtractor, Record};

/// Fields that every record merged into one result must agree on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombineFields(Vec<String>);

impl CombineFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Fail when both records carry a combine field with different values
    pub fn check(&self, left: &Record, right: &Record) -> ReleaseResult<()> {
        for field in &self.0 {
            let left_value = left.get(field).and_then(scalar_text);
            let right_value = right.get(field).and_then(scalar_text);
            if let (Some(l), Some(r)) = (left_value, right_value) {
                if l != r {
                    return Err(ReleaseError::KeyMismatch {
                        field: field.clone(),
                        left: l,
                        right: r,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Merge `right` into `left`; `left` is the earlier source
pub fn merge_records(left: Record, right: Record, fields: &CombineFields) -> ReleaseResult<Record> {
    fields.check(&left, &right)?;
    Ok(Record::from_map(merge_maps(left.into_map(), right.into_map())))
}

fn merge_maps(mut left: Map<String, Value>, right: Map<String, Value>) -> Map<String, Value> {
    for (field, value) in right {
        match left.get_mut(&field) {
            Some(existing) => {
                let current = std::mem::take(existing);
                *existing = merge_values(current, value);
            }
            None => {
                left.insert(field, value);
            }
        }
    }
    left
}

fn merge_values(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Null, right) => right,
        (Value::Array(mut items), Value::Array(more)) => {
            items.extend(more);
            Value::Array(items)
        }
        (Value::Object(left), Value::Object(right)) => Value::Object(merge_maps(left, right)),
        (left, _) => left,
    }
}

/// Fold same-shaped sources into one record per key.
///
/// Sources are visited in declared order and records within a source in
/// arrival order, so scalar resolution is deterministic for a fixed input.
/// Records without a key are dropped.
pub fn combine<K>(
    sources: Vec<Vec<Record>>,
    key: &K,
    fields: &CombineFields,
) -> ReleaseResult<Vec<Record>>
where
    K: KeyExtractor + ?Sized,
{
    let mut slots: HashMap<JoinKey, usize> = HashMap::new();
    let mut combined: Vec<Record> = Vec::new();
    let mut dropped = 0usize;

    for record in sources.into_iter().flatten() {
        let Some(join_key) = key.extract(&record) else {
            dropped += 1;
            continue;
        };
        match slots.get(&join_key) {
            Some(&slot) => {
                let existing = std::mem::take(&mut combined[slot]);
                combined[slot] = merge_records(existing, record, fields)?;
            }
            None => {
                slots.insert(join_key, combined.len());
                combined.push(record);
            }
        }
    }

    if dropped > 0 {
        debug!(dropped, "Dropped records without a combine key");
    }
    Ok(combined)
}
