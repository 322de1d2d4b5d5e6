//! Document assembly
//!
//! A joined record becomes a document in three steps: project the primary
//! collection, enrich from broadcast tables, then shape the payload for the
//! document's classifier.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{trace, warn};

use super::registry::{DocumentClassifier, DocumentTypeSpec};
use super::Document;
use crate::broadcast::{BroadcastTable, BroadcastType, Broadcasts};
use crate::error::ReleaseResult;
use crate::model::{scalar_text, JoinKey, Record, PATH_SEPARATOR};

/// Field holding the searchable payload of text documents
pub const TEXT_FIELD: &str = "text";

const GO_TERM: &str = "go_term";
const GO_TERM_ALT_IDS: &str = "go_term.alt_ids";
const ALT_IDS: &str = "altIds";

/// Builds documents of one type from joined records
#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    spec: Arc<DocumentTypeSpec>,
    broadcasts: Arc<Broadcasts>,
}

impl DocumentAssembler {
    /// Fails when a broadcast the type depends on was not built
    pub fn new(spec: Arc<DocumentTypeSpec>, broadcasts: Arc<Broadcasts>) -> ReleaseResult<Self> {
        broadcasts.require(spec.document_type, &spec.broadcasts)?;
        Ok(Self { spec, broadcasts })
    }

    pub fn spec(&self) -> &DocumentTypeSpec {
        &self.spec
    }

    /// Assemble one document; records without an id are skipped
    pub fn assemble(&self, record: &Record) -> Option<Document> {
        let Some(id) = self.spec.document_id(record) else {
            warn!(
                document_type = %self.spec.document_type,
                id_fields = ?self.spec.id_fields,
                "Skipping record without document id"
            );
            return None;
        };

        let mut payload = self.spec.project(self.spec.collection, record);

        let mut enriched = HashSet::new();
        for broadcast in &self.spec.broadcasts {
            if *broadcast == BroadcastType::Sample
                || broadcast.collection() == self.spec.collection
            {
                continue;
            }
            if let Some(table) = self.broadcasts.get(*broadcast) {
                self.enrich(&mut payload, record, table);
                enriched.insert(broadcast.collection());
            }
        }

        for collection in self.spec.projected_collections() {
            if collection == self.spec.collection || enriched.contains(&collection) {
                continue;
            }
            let projection = self.spec.projection(collection);
            if let Some(nested) = payload.get_mut(collection.as_str()) {
                project_nested(nested, |map| projection.project(&Record::from_map(map)).into_map());
            }
        }

        let payload = match self.spec.classifier {
            DocumentClassifier::Basic => payload,
            DocumentClassifier::Text => text_payload(payload),
        };

        trace!(document_type = %self.spec.document_type, %id, "Assembled document");
        Some(Document::new(self.spec.document_type, id, payload))
    }

    /// Merge broadcast records into the payload. Existing nested entries are
    /// enriched in place with their own fields winning; otherwise lookups by
    /// the record's key values are attached. Absent keys attach nothing.
    fn enrich(&self, payload: &mut Record, source: &Record, table: &BroadcastTable) {
        let broadcast = table.broadcast_type();
        let projection = self.spec.projection(broadcast.collection());
        let target = broadcast.as_str();

        if let Some(existing) = payload.get_mut(target) {
            project_nested(existing, |mut element| {
                if let Some(found) = table.lookup_for(&Record::from_map(element.clone())) {
                    for (field, value) in projection.project(found).into_map() {
                        element.entry(field).or_insert(value);
                    }
                }
                element
            });
            return;
        }

        let key_fields = broadcast.key_fields();
        let Some(key_field) = key_fields.names().first() else {
            return;
        };
        let found: Vec<Value> = key_values(source, key_field)
            .into_iter()
            .filter_map(|value| table.lookup(&JoinKey::single(key_field.as_str(), value)))
            .map(|record| projection.project(record).into_value())
            .collect();

        match broadcast {
            BroadcastType::Gene => {
                if !found.is_empty() {
                    payload.insert(target, Value::Array(found));
                }
            }
            _ => {
                if let Some(first) = found.into_iter().next() {
                    payload.insert(target, first);
                }
            }
        }
    }
}

/// Distinct key values carried by the record itself or its consequences
fn key_values(record: &Record, key_field: &str) -> Vec<String> {
    let nested = format!("{}{PATH_SEPARATOR}{key_field}", crate::join::observation::CONSEQUENCE);
    let mut seen = HashSet::new();
    record
        .values_at(key_field)
        .into_iter()
        .chain(record.values_at(&nested))
        .filter_map(scalar_text)
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

/// Apply `f` to a nested object or to every object of a nested array
fn project_nested<F>(value: &mut Value, mut f: F)
where
    F: FnMut(Map<String, Value>) -> Map<String, Value>,
{
    match value {
        Value::Object(map) => *map = f(std::mem::take(map)),
        Value::Array(items) => {
            for item in items.iter_mut() {
                if let Value::Object(map) = item {
                    *map = f(std::mem::take(map));
                }
            }
        }
        _ => {}
    }
}

fn text_payload(mut payload: Record) -> Record {
    if let Some(alt_ids) = payload.get(GO_TERM_ALT_IDS).cloned() {
        payload.remove(GO_TERM);
        payload.insert(ALT_IDS, alt_ids);
    }
    Record::new().with(TEXT_FIELD, payload.into_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastTable;
    use crate::document::{DocumentType, DocumentTypeRegistry};
    use crate::error::ReleaseError;
    use serde_json::json;
    use std::collections::HashMap;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn registry() -> DocumentTypeRegistry {
        DocumentTypeRegistry::build(&HashMap::new()).unwrap()
    }

    fn broadcasts() -> Arc<Broadcasts> {
        Arc::new(
            Broadcasts::new()
                .with_table(BroadcastTable::build(
                    BroadcastType::Project,
                    vec![record(json!({
                        "_project_id": "BRCA-UK",
                        "project_name": "Breast",
                        "primary_site": "Breast",
                        "_summary": {"_total_donor_count": 10}
                    }))],
                ))
                .with_table(BroadcastTable::build(
                    BroadcastType::Gene,
                    vec![record(json!({
                        "_gene_id": "G1",
                        "symbol": "TP53",
                        "transcripts": [{"id": "T1"}]
                    }))],
                ))
                .with_table(BroadcastTable::build(
                    BroadcastType::Donor,
                    vec![record(json!({"_donor_id": "DO1", "donor_sex": "female", "specimen": []}))],
                )),
        )
    }

    #[test]
    fn test_donor_centric_enriches_genes_in_place_and_attaches_project() {
        let registry = registry();
        let spec = registry.get(DocumentType::DonorCentric).unwrap().clone();
        let assembler = DocumentAssembler::new(spec, broadcasts()).unwrap();

        let donor = record(json!({
            "_id": "internal",
            "_donor_id": "DO1",
            "_project_id": "BRCA-UK",
            "donor_sex": "female",
            "gene": [{"_gene_id": "G1", "_summary": {"_ssm_count": 3}}, {"_gene_id": "G404"}]
        }));
        let document = assembler.assemble(&donor).unwrap();

        assert_eq!(document.id, "DO1");
        assert!(!document.payload.contains("_id"));
        assert_eq!(
            document.payload.get("project").unwrap(),
            &json!({"_project_id": "BRCA-UK", "primary_site": "Breast", "project_name": "Breast"})
        );
        let genes = document.payload.array("gene");
        assert_eq!(genes[0]["symbol"], json!("TP53"));
        assert_eq!(genes[0]["_summary"]["_ssm_count"], json!(3));
        assert!(genes[0].get("transcripts").is_none());
        assert_eq!(genes[1], json!({"_gene_id": "G404"}));
    }

    #[test]
    fn test_observation_centric_attaches_genes_from_consequences() {
        let registry = registry();
        let spec = registry.get(DocumentType::ObservationCentric).unwrap().clone();
        let assembler = DocumentAssembler::new(spec, broadcasts()).unwrap();

        let occurrence = record(json!({
            "_donor_id": "DO1",
            "_mutation_id": "MU1",
            "_project_id": "PACA-CA",
            "consequence": [{"_gene_id": "G1"}, {"_gene_id": "G1"}, {"_gene_id": "G2"}]
        }));
        let document = assembler.assemble(&occurrence).unwrap();

        assert_eq!(document.id, "DO1:MU1");
        assert!(!document.payload.contains("project"));
        assert_eq!(document.payload.array("gene").len(), 1);
        assert_eq!(document.payload.array("gene")[0]["symbol"], json!("TP53"));
        assert_eq!(document.payload.get("donor.donor_sex"), Some(&json!("female")));
        assert!(document.payload.get("donor.specimen").is_none());
    }

    #[test]
    fn test_gene_set_text_lifts_alt_ids() {
        let registry = registry();
        let spec = registry.get(DocumentType::GeneSetText).unwrap().clone();
        let assembler = DocumentAssembler::new(spec, Arc::new(Broadcasts::new())).unwrap();

        let gene_set = record(json!({
            "id": "GO:0001",
            "name": "apoptosis",
            "go_term": {"alt_ids": ["GO:0002"], "synonyms": ["x"]},
            "genes": 12
        }));
        let document = assembler.assemble(&gene_set).unwrap();
        assert_eq!(
            document.payload.into_value(),
            json!({"text": {"id": "GO:0001", "name": "apoptosis", "altIds": ["GO:0002"]}})
        );
    }

    #[test]
    fn test_missing_id_skips_record() {
        let registry = registry();
        let spec = registry.get(DocumentType::Project).unwrap().clone();
        let assembler = DocumentAssembler::new(spec, Arc::new(Broadcasts::new())).unwrap();
        assert!(assembler.assemble(&record(json!({"project_name": "x"}))).is_none());
    }

    #[test]
    fn test_missing_broadcast_is_rejected() {
        let registry = registry();
        let spec = registry.get(DocumentType::GeneCentric).unwrap().clone();
        let err = DocumentAssembler::new(spec, Arc::new(Broadcasts::new())).unwrap_err();
        assert!(matches!(err, ReleaseError::MissingBroadcast { .. }));
        assert!(err.is_fatal_startup());
    }
}
