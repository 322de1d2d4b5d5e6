//! Include/exclude field lists per source collection

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ReleaseCollection;

/// Field paths kept or dropped for one collection. At most one of the two
/// lists may be non-empty; both empty means identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionFields {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<String>,
}

impl CollectionFields {
    pub fn include<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            included: paths.into_iter().map(Into::into).collect(),
            excluded: Vec::new(),
        }
    }

    pub fn exclude<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            included: Vec::new(),
            excluded: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty()
    }

    /// Reject lists naming both included and excluded paths
    pub fn validate(&self) -> Result<(), String> {
        if !self.included.is_empty() && !self.excluded.is_empty() {
            return Err(format!(
                "both included ({}) and excluded ({}) fields are set",
                self.included.join(", "),
                self.excluded.join(", ")
            ));
        }
        if let Some(empty) = self
            .included
            .iter()
            .chain(&self.excluded)
            .find(|path| path.split('.').any(str::is_empty))
        {
            return Err(format!("malformed field path '{empty}'"));
        }
        Ok(())
    }
}

/// Named sub-collection projections composed into one document shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFields(BTreeMap<ReleaseCollection, CollectionFields>);

impl DocumentFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, collection: ReleaseCollection, fields: CollectionFields) -> Self {
        self.0.insert(collection, fields);
        self
    }

    pub fn get(&self, collection: ReleaseCollection) -> Option<&CollectionFields> {
        self.0.get(&collection)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ReleaseCollection, &CollectionFields)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_lists_fail_validation() {
        let fields = CollectionFields {
            included: vec!["_donor_id".into()],
            excluded: vec!["gene".into()],
        };
        assert!(fields.validate().unwrap_err().contains("both included"));
    }

    #[test]
    fn test_malformed_path_fails_validation() {
        assert!(CollectionFields::include(["specimen..sample"]).validate().is_err());
        assert!(CollectionFields::exclude(["_id", "gene"]).validate().is_ok());
        assert!(CollectionFields::default().is_identity());
    }
}
