//! Document type registry
//!
//! The registry is a data table with one entry per document type, validated
//! once at startup. Validation accumulates every problem (gaps, duplicates,
//! conflicting field lists, zero sizes) so a broken table is reported in a
//! single pass before any data is read.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use stillwater::Validation;
use tracing::debug;

use super::fields::{CollectionFields, DocumentFields};
use super::projector::FieldProjection;
use super::DocumentType;
use crate::broadcast::BroadcastType;
use crate::broadcast::BroadcastType as B;
use crate::error::{ReleaseError, ReleaseResult};
use crate::model::{scalar_text, Record, ReleaseCollection};
use crate::model::ReleaseCollection as C;

pub const DEFAULT_BATCH_SIZE: usize = 1;
pub const DEFAULT_STATUS_INTERVAL: usize = 1000;

/// Separator between id field values of compound document ids
pub const ID_SEPARATOR: char = ':';

static IDENTITY: FieldProjection = FieldProjection::Identity;

/// Shape of the indexed payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentClassifier {
    /// Projected record as-is
    Basic,
    /// Projected record wrapped for full-text search
    Text,
}

/// Where assembled documents are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputDestination {
    SearchIndex,
    Export,
    JsonLines,
}

/// Field lists for one sub-collection of a document type
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub collection: ReleaseCollection,
    pub include: &'static [&'static str],
    pub exclude: &'static [&'static str],
}

impl FieldRule {
    pub const fn include(collection: ReleaseCollection, paths: &'static [&'static str]) -> Self {
        Self {
            collection,
            include: paths,
            exclude: &[],
        }
    }

    pub const fn exclude(collection: ReleaseCollection, paths: &'static [&'static str]) -> Self {
        Self {
            collection,
            include: &[],
            exclude: paths,
        }
    }

    fn to_fields(self) -> CollectionFields {
        CollectionFields {
            included: self.include.iter().map(|p| p.to_string()).collect(),
            excluded: self.exclude.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// One row of the registry table
#[derive(Debug, Clone, Copy)]
pub struct DocumentTypeEntry {
    pub document_type: DocumentType,
    /// Kind of entity the document describes
    pub entity: ReleaseCollection,
    /// Collection the primary records are read from
    pub collection: ReleaseCollection,
    /// Fields whose values form the document id
    pub id_fields: &'static [&'static str],
    pub classifier: DocumentClassifier,
    pub destination: OutputDestination,
    pub broadcasts: &'static [BroadcastType],
    pub fields: &'static [FieldRule],
    pub batch_size: usize,
    pub status_interval: usize,
}

const BASE: DocumentTypeEntry = DocumentTypeEntry {
    document_type: DocumentType::Diagram,
    entity: ReleaseCollection::Diagram,
    collection: ReleaseCollection::Diagram,
    id_fields: &[],
    classifier: DocumentClassifier::Basic,
    destination: OutputDestination::SearchIndex,
    broadcasts: &[],
    fields: &[],
    batch_size: DEFAULT_BATCH_SIZE,
    status_interval: DEFAULT_STATUS_INTERVAL,
};

/// Every document type a release produces
pub static DOCUMENT_TYPES: &[DocumentTypeEntry] = &[
    DocumentTypeEntry {
        document_type: DocumentType::Diagram,
        entity: C::Diagram,
        collection: C::Diagram,
        id_fields: &["diagram_id"],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::Release,
        entity: C::Release,
        collection: C::Release,
        id_fields: &["_release_id"],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::GeneSet,
        entity: C::GeneSet,
        collection: C::GeneSet,
        id_fields: &["id"],
        fields: &[
            FieldRule::include(
                C::Gene,
                &["_gene_id", "sets.id", "sets.type", "project._project_id", "donor"],
            ),
            FieldRule::include(
                C::Project,
                &[
                    "_project_id",
                    "project_name",
                    "primary_site",
                    "tumour_type",
                    "tumour_subtype",
                    "_summary._ssm_tested_donor_count",
                    "_summary._total_donor_count",
                ],
            ),
        ],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::GeneSetText,
        entity: C::GeneSet,
        collection: C::GeneSet,
        id_fields: &["id"],
        classifier: DocumentClassifier::Text,
        fields: &[FieldRule::include(
            C::GeneSet,
            &["id", "name", "type", "source", "go_term.alt_ids"],
        )],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::Project,
        entity: C::Project,
        collection: C::Project,
        id_fields: &["_project_id"],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::ProjectText,
        entity: C::Project,
        collection: C::Project,
        id_fields: &["_project_id"],
        classifier: DocumentClassifier::Text,
        fields: &[FieldRule::include(
            C::Project,
            &[
                "_project_id",
                "project_name",
                "tumour_type",
                "tumour_subtype",
                "primary_site",
                "_summary._state",
            ],
        )],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::Donor,
        entity: C::Donor,
        collection: C::Donor,
        id_fields: &["_donor_id"],
        broadcasts: &[B::Project],
        fields: &[FieldRule::exclude(C::Donor, &["_id", "gene"])],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::DonorText,
        entity: C::Donor,
        collection: C::Donor,
        id_fields: &["_donor_id"],
        classifier: DocumentClassifier::Text,
        fields: &[FieldRule::include(
            C::Donor,
            &[
                "_donor_id",
                "_project_id",
                "donor_id",
                "specimen._specimen_id",
                "specimen.specimen_id",
                "specimen.sample._sample_id",
                "specimen.sample.analyzed_sample_id",
                "_summary._state",
            ],
        )],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::DonorCentric,
        entity: C::Donor,
        collection: C::Donor,
        id_fields: &["_donor_id"],
        broadcasts: &[B::Gene, B::Project],
        fields: &[
            FieldRule::include(C::Project, &["_project_id", "primary_site", "project_name"]),
            FieldRule::include(
                C::Donor,
                &[
                    "_donor_id",
                    "_project_id",
                    "gene._gene_id",
                    "gene._summary._ssm_count",
                    "_summary",
                    "donor_id",
                    "disease_status_last_followup",
                    "donor_age_at_diagnosis",
                    "donor_age_at_enrollment",
                    "donor_age_at_last_followup",
                    "donor_diagnosis_icd10",
                    "donor_interval_of_last_followup",
                    "donor_relapse_interval",
                    "donor_relapse_type",
                    "donor_sex",
                    "donor_survival_time",
                    "donor_tumour_stage_at_diagnosis",
                    "donor_tumour_stage_at_diagnosis_supplemental",
                    "donor_tumour_staging_system_at_diagnosis",
                    "donor_vital_status",
                    "specimen",
                    "therapy",
                    "family",
                    "exposure",
                ],
            ),
            FieldRule::include(
                C::Gene,
                &[
                    "_gene_id",
                    "symbol",
                    "biotype",
                    "chromosome",
                    "start",
                    "end",
                    "sets.id",
                    "sets.type",
                ],
            ),
            FieldRule::include(
                C::Observation,
                &[
                    "_mutation_id",
                    "_donor_id",
                    "consequence._gene_id",
                    "consequence.consequence_type",
                    "consequence.functional_impact_prediction_summary",
                    "_type",
                    "mutation_type",
                    "platform",
                    "validation_status",
                    "verification_status",
                    "chromosome",
                    "chromosome_end",
                    "chromosome_start",
                    "observation",
                ],
            ),
        ],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::Gene,
        entity: C::Gene,
        collection: C::Gene,
        id_fields: &["_gene_id"],
        fields: &[
            FieldRule::exclude(C::Gene, &["donor"]),
            FieldRule::exclude(C::Observation, &["_id", "_summary", "project", "donor"]),
        ],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::GeneText,
        entity: C::Gene,
        collection: C::Gene,
        id_fields: &["_gene_id"],
        classifier: DocumentClassifier::Text,
        fields: &[FieldRule::include(
            C::Gene,
            &["_gene_id", "symbol", "name", "synonyms", "external_db_ids"],
        )],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::GeneCentric,
        entity: C::Gene,
        collection: C::Gene,
        id_fields: &["_gene_id"],
        broadcasts: &[B::Donor, B::Project],
        fields: &[
            FieldRule::exclude(C::Donor, &["_id", "gene", "specimen"]),
            FieldRule::exclude(
                C::Observation,
                &[
                    "_id",
                    "functional_impact_prediction_summary",
                    "consequence.functional_impact_prediction",
                ],
            ),
        ],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::ObservationCentric,
        entity: C::Observation,
        collection: C::Observation,
        id_fields: &["_donor_id", "_mutation_id"],
        broadcasts: &[B::Donor, B::Project, B::Gene],
        fields: &[
            FieldRule::include(C::Project, &["_project_id", "project_name", "primary_site"]),
            FieldRule::exclude(C::Donor, &["_id", "gene", "specimen"]),
            FieldRule::exclude(C::Gene, &["_id", "project", "donor", "transcripts"]),
            FieldRule::exclude(
                C::Observation,
                &[
                    "_id",
                    "functional_impact_prediction_summary",
                    "consequence.functional_impact_prediction",
                ],
            ),
        ],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::MutationText,
        entity: C::Mutation,
        collection: C::Mutation,
        id_fields: &["_mutation_id"],
        classifier: DocumentClassifier::Text,
        broadcasts: &[B::Gene],
        fields: &[
            FieldRule::include(
                C::Mutation,
                &["_mutation_id", "mutation", "chromosome", "chromosome_start", "consequence"],
            ),
            FieldRule::include(
                C::Observation,
                &["_mutation_id", "consequence._gene_id", "consequence.aa_mutation", "mutation"],
            ),
            FieldRule::include(C::Gene, &["_gene_id", "symbol"]),
        ],
        ..BASE
    },
    DocumentTypeEntry {
        document_type: DocumentType::MutationCentric,
        entity: C::Mutation,
        collection: C::Mutation,
        id_fields: &["_mutation_id"],
        broadcasts: &[B::Donor, B::Project, B::Gene],
        fields: &[
            FieldRule::exclude(C::Donor, &["_id", "gene", "specimen"]),
            FieldRule::exclude(
                C::Gene,
                &["_id", "project", "donor", "transcripts.domains", "transcripts.exons"],
            ),
        ],
        ..BASE
    },
];

/// Per-type settings supplied by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeOverride {
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub status_interval: Option<usize>,
    #[serde(default)]
    pub destination: Option<OutputDestination>,
}

/// Validated, immutable settings of one document type
#[derive(Debug, Clone)]
pub struct DocumentTypeSpec {
    pub document_type: DocumentType,
    pub entity: ReleaseCollection,
    pub collection: ReleaseCollection,
    pub id_fields: Vec<String>,
    pub classifier: DocumentClassifier,
    pub destination: OutputDestination,
    pub broadcasts: Vec<BroadcastType>,
    pub fields: DocumentFields,
    pub batch_size: usize,
    pub status_interval: usize,
    projections: BTreeMap<ReleaseCollection, FieldProjection>,
}

impl DocumentTypeSpec {
    /// Projection for a sub-collection; identity when none is declared
    pub fn projection(&self, collection: ReleaseCollection) -> &FieldProjection {
        self.projections.get(&collection).unwrap_or(&IDENTITY)
    }

    pub fn project(&self, collection: ReleaseCollection, record: &Record) -> Record {
        self.projection(collection).project(record)
    }

    /// Collections with declared field lists
    pub fn projected_collections(&self) -> impl Iterator<Item = ReleaseCollection> + '_ {
        self.projections.keys().copied()
    }

    /// Document id from the id fields; `None` when any is missing
    pub fn document_id(&self, record: &Record) -> Option<String> {
        let parts = self
            .id_fields
            .iter()
            .map(|field| record.get(field).and_then(scalar_text))
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join(&ID_SEPARATOR.to_string()))
    }
}

/// Closed map from document type to its spec
#[derive(Debug, Clone)]
pub struct DocumentTypeRegistry {
    specs: BTreeMap<DocumentType, Arc<DocumentTypeSpec>>,
}

impl DocumentTypeRegistry {
    /// Build the registry from the shipped table
    pub fn build(overrides: &HashMap<DocumentType, TypeOverride>) -> ReleaseResult<Self> {
        Self::from_entries(DOCUMENT_TYPES, overrides)
    }

    /// Build and validate a registry from an arbitrary table
    pub fn from_entries(
        entries: &[DocumentTypeEntry],
        overrides: &HashMap<DocumentType, TypeOverride>,
    ) -> ReleaseResult<Self> {
        let specs = Validation::all_vec(
            entries
                .iter()
                .map(|entry| {
                    validate_entry(entry, overrides.get(&entry.document_type).copied().unwrap_or_default())
                })
                .collect(),
        );

        match specs.and(validate_coverage(entries)) {
            Validation::Success((specs, ())) => {
                debug!(count = specs.len(), "Document type registry validated");
                Ok(Self {
                    specs: specs
                        .into_iter()
                        .map(|spec| (spec.document_type, Arc::new(spec)))
                        .collect(),
                })
            }
            Validation::Failure(errors) => Err(ReleaseError::Registry(errors)),
        }
    }

    pub fn get(&self, document_type: DocumentType) -> Option<&Arc<DocumentTypeSpec>> {
        self.specs.get(&document_type)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DocumentTypeSpec>> {
        self.specs.values()
    }
}

fn validate_entry(
    entry: &DocumentTypeEntry,
    overrides: TypeOverride,
) -> Validation<DocumentTypeSpec, Vec<String>> {
    let name = entry.document_type;
    let mut errors = Vec::new();
    let mut fields = DocumentFields::new();
    let mut projections = BTreeMap::new();

    for rule in entry.fields {
        let collection_fields = rule.to_fields();
        match collection_fields.validate() {
            Ok(()) => {
                projections.insert(rule.collection, FieldProjection::compile(&collection_fields));
                fields = fields.with(rule.collection, collection_fields);
            }
            Err(problem) => errors.push(format!("{name}: {} fields: {problem}", rule.collection)),
        }
    }

    let batch_size = overrides.batch_size.unwrap_or(entry.batch_size);
    let status_interval = overrides.status_interval.unwrap_or(entry.status_interval);
    if batch_size == 0 {
        errors.push(format!("{name}: batch size must be positive"));
    }
    if status_interval == 0 {
        errors.push(format!("{name}: status interval must be positive"));
    }
    if entry.id_fields.is_empty() {
        errors.push(format!("{name}: no id fields declared"));
    }

    if !errors.is_empty() {
        return Validation::failure(errors);
    }

    Validation::success(DocumentTypeSpec {
        document_type: name,
        entity: entry.entity,
        collection: entry.collection,
        id_fields: entry.id_fields.iter().map(|f| f.to_string()).collect(),
        classifier: entry.classifier,
        destination: overrides.destination.unwrap_or(entry.destination),
        broadcasts: entry.broadcasts.to_vec(),
        fields,
        batch_size,
        status_interval,
        projections,
    })
}

fn validate_coverage(entries: &[DocumentTypeEntry]) -> Validation<(), Vec<String>> {
    let mut counts: BTreeMap<DocumentType, usize> = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.document_type).or_default() += 1;
    }

    let mut errors: Vec<String> = DocumentType::ALL
        .iter()
        .filter(|document_type| !counts.contains_key(document_type))
        .map(|document_type| format!("{document_type}: no registry entry"))
        .collect();
    errors.extend(
        counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(document_type, count)| format!("{document_type}: {count} registry entries")),
    );

    if errors.is_empty() {
        Validation::success(())
    } else {
        Validation::failure(errors)
    }
}
