//! Join key extraction

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{scalar_text, Record};

/// Tuple of (field path, value) pairs compared structurally
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JoinKey(Vec<(String, String)>);

impl JoinKey {
    pub fn new(parts: Vec<(String, String)>) -> Self {
        Self(parts)
    }

    /// Single-field key
    pub fn single(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self(vec![(field.into(), value.into())])
    }

    pub fn parts(&self) -> &[(String, String)] {
        &self.0
    }

    /// Value of one key field
    pub fn value(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Key values without field names, for matching streams that name the
    /// shared identifier differently
    pub fn values(&self) -> Vec<String> {
        self.0.iter().map(|(_, value)| value.clone()).collect()
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|(field, value)| format!("{field}={value}"))
            .collect();
        write!(f, "({})", rendered.join(", "))
    }
}

/// Extracts a join key from a record; `None` when the record has no key
pub trait KeyExtractor: Send + Sync {
    fn extract(&self, record: &Record) -> Option<JoinKey>;
}

impl<F> KeyExtractor for F
where
    F: Fn(&Record) -> Option<JoinKey> + Send + Sync,
{
    fn extract(&self, record: &Record) -> Option<JoinKey> {
        self(record)
    }
}

/// Ordered list of key field paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFields(Vec<String>);

impl KeyFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Remove the key fields from a record
    pub fn strip(&self, mut record: Record) -> Record {
        for field in &self.0 {
            record.remove(field);
        }
        record
    }
}

impl KeyExtractor for KeyFields {
    fn extract(&self, record: &Record) -> Option<JoinKey> {
        self.0
            .iter()
            .map(|field| {
                record
                    .get(field)
                    .and_then(scalar_text)
                    .map(|value| (field.clone(), value))
            })
            .collect::<Option<Vec<_>>>()
            .map(JoinKey)
    }
}
