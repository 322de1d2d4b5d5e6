//! Broadcast enrichment store
//!
//! Small dimension tables (projects, donors, genes, donor samples) are built
//! once before a stage starts and shared read-only with every partition
//! through an `Arc`. Lookups never mutate a table, so partitions observe the
//! same complete view without synchronization.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::document::DocumentType;
use crate::error::{ReleaseError, ReleaseResult};
use crate::model::{JoinKey, KeyExtractor, KeyFields, Record, ReleaseCollection};

/// Namespace of a broadcast table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastType {
    Project,
    Donor,
    Gene,
    /// Donor, specimen and sample surrogate ids by analyzed sample
    Sample,
}

impl BroadcastType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Donor => "donor",
            Self::Gene => "gene",
            Self::Sample => "sample",
        }
    }

    /// Collection whose field lists project this table's records
    pub fn collection(&self) -> ReleaseCollection {
        match self {
            Self::Project => ReleaseCollection::Project,
            Self::Donor => ReleaseCollection::Donor,
            Self::Gene => ReleaseCollection::Gene,
            Self::Sample => ReleaseCollection::Sample,
        }
    }

    /// Fields forming the lookup key
    pub fn key_fields(&self) -> KeyFields {
        match self {
            Self::Project => KeyFields::new(["_project_id"]),
            Self::Donor => KeyFields::new(["_donor_id"]),
            Self::Gene => KeyFields::new(["_gene_id"]),
            Self::Sample => KeyFields::new(["_project_id", "analyzed_sample_id"]),
        }
    }
}

impl fmt::Display for BroadcastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable lookup table for one namespace
#[derive(Debug, Clone)]
pub struct BroadcastTable {
    broadcast_type: BroadcastType,
    key_fields: KeyFields,
    entries: HashMap<JoinKey, Record>,
}

impl BroadcastTable {
    /// Build a table from its authoritative records. Records without a key
    /// are skipped; on duplicate keys the first record wins.
    pub fn build<I>(broadcast_type: BroadcastType, records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        let key_fields = broadcast_type.key_fields();
        let mut entries = HashMap::new();

        for record in records {
            let Some(key) = key_fields.extract(&record) else {
                debug!(broadcast = %broadcast_type, "Skipping broadcast record without key");
                continue;
            };
            if entries.contains_key(&key) {
                warn!(broadcast = %broadcast_type, %key, "Duplicate broadcast key, keeping first");
                continue;
            }
            entries.insert(key, record);
        }

        Self {
            broadcast_type,
            key_fields,
            entries,
        }
    }

    pub fn broadcast_type(&self) -> BroadcastType {
        self.broadcast_type
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Absent keys are not an error; callers pick their own default
    pub fn lookup(&self, key: &JoinKey) -> Option<&Record> {
        self.entries.get(key)
    }

    /// Look up using the key fields carried by `record`
    pub fn lookup_for(&self, record: &Record) -> Option<&Record> {
        self.key_fields
            .extract(record)
            .and_then(|key| self.entries.get(&key))
    }
}

/// Every table available to a stage
#[derive(Debug, Clone, Default)]
pub struct Broadcasts {
    tables: HashMap<BroadcastType, Arc<BroadcastTable>>,
}

impl Broadcasts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: BroadcastTable) -> Self {
        self.insert(table);
        self
    }

    pub fn insert(&mut self, table: BroadcastTable) {
        self.tables.insert(table.broadcast_type(), Arc::new(table));
    }

    pub fn get(&self, broadcast_type: BroadcastType) -> Option<&BroadcastTable> {
        self.tables.get(&broadcast_type).map(Arc::as_ref)
    }

    pub fn contains(&self, broadcast_type: BroadcastType) -> bool {
        self.tables.contains_key(&broadcast_type)
    }

    /// Fail before any data is read when a declared dependency is missing
    pub fn require(
        &self,
        document_type: DocumentType,
        required: &[BroadcastType],
    ) -> ReleaseResult<()> {
        match required.iter().find(|broadcast| !self.contains(**broadcast)) {
            Some(missing) => Err(ReleaseError::MissingBroadcast {
                document_type,
                broadcast: missing.to_string(),
            }),
            None => Ok(()),
        }
    }
}
