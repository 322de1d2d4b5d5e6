//! Mutation occurrence join
//!
//! Primary observation records are enriched with their analysis metadata,
//! the donor sample surrogate ids and their consequences, then grouped into
//! one occurrence per (donor, mutation). Consequences of every grouped
//! observation are collapsed to the most severe per transcript.

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::combine::{combine, merge_records, CombineFields};
use super::outer::{join, Secondary};
use crate::broadcast::BroadcastTable;
use crate::consequence::{aggregate, ConsequenceCandidate, MutationTally, Tallies};
use crate::error::ReleaseResult;
use crate::model::{JoinKey, KeyExtractor, KeyFields, Record};

pub const OBSERVATION: &str = "observation";
pub const CONSEQUENCE: &str = "consequence";

/// Data type recorded on occurrences built by this join
pub const SSM_TYPE: &str = "ssm";

/// Mutation-level fields lifted from observations onto the occurrence
pub const OCCURRENCE_FIELDS: [&str; 14] = [
    "_donor_id",
    "_mutation_id",
    "_project_id",
    "_type",
    "assembly_version",
    "chromosome",
    "chromosome_end",
    "chromosome_start",
    "chromosome_strand",
    "mutated_from_allele",
    "mutated_to_allele",
    "mutation",
    "mutation_type",
    "reference_genome_allele",
];

/// Observation collections of one partition, colocated by project
#[derive(Debug, Clone, Default)]
pub struct ObservationCollections {
    /// Primary observation records
    pub primary: Vec<Record>,
    /// Analysis metadata keyed by analysis and analyzed sample
    pub meta: Vec<Record>,
    /// Consequence records keyed by observation
    pub secondary: Vec<Record>,
}

/// Occurrences plus the per-mutation tally of this partition
#[derive(Debug, Clone, Default)]
pub struct ObservationJoin {
    pub occurrences: Vec<Record>,
    pub tallies: Tallies,
}

fn meta_key() -> KeyFields {
    KeyFields::new(["analysis_id", "analyzed_sample_id"])
}

fn observation_key() -> KeyFields {
    KeyFields::new(["observation_id"])
}

fn occurrence_key() -> KeyFields {
    KeyFields::new(["_donor_id", "_mutation_id"])
}

struct Occurrence {
    fields: Record,
    observations: Vec<Value>,
    candidates: Vec<ConsequenceCandidate>,
}

/// Join observations into occurrences. `samples` is the sample broadcast.
pub fn join_observations(
    collections: ObservationCollections,
    samples: &BroadcastTable,
) -> ReleaseResult<ObservationJoin> {
    let ObservationCollections {
        primary,
        meta,
        secondary,
    } = collections;

    let meta_fields = CombineFields::new(meta_key().names().to_vec());
    let meta_index: HashMap<JoinKey, Record> = combine(vec![meta], &meta_key(), &meta_fields)?
        .into_iter()
        .filter_map(|record| meta_key().extract(&record).map(|key| (key, record)))
        .collect();

    let mut enriched = Vec::with_capacity(primary.len());
    for record in primary {
        let record = match meta_key()
            .extract(&record)
            .and_then(|key| meta_index.get(&key))
        {
            Some(meta) => merge_records(record, meta.clone(), &meta_fields)?,
            None => record,
        };
        enriched.push(attach_sample_ids(record, samples));
    }

    let observations = join(
        enriched,
        vec![Secondary::new(CONSEQUENCE, observation_key(), secondary).stripping_key()],
        &observation_key(),
        &CombineFields::none(),
    )?;

    group_occurrences(observations)
}

fn attach_sample_ids(mut record: Record, samples: &BroadcastTable) -> Record {
    let Some(sample) = samples.lookup_for(&record) else {
        debug!(
            analyzed_sample_id = ?record.text("analyzed_sample_id"),
            "No donor sample for observation"
        );
        return record;
    };
    for field in ["_donor_id", "_specimen_id", "_sample_id"] {
        if let Some(value) = sample.get(field) {
            if !record.contains(field) {
                record.insert(field, value.clone());
            }
        }
    }

    let matched = record.text("_project_id").zip(record.text("matched_sample_id"));
    if let Some((project, matched_sample)) = matched {
        let matched_key = Record::new()
            .with("_project_id", project)
            .with("analyzed_sample_id", matched_sample);
        if let Some(id) = samples.lookup_for(&matched_key).and_then(|s| s.get("_sample_id")) {
            record.insert("_matched_sample_id", id.clone());
        }
    }
    record
}

fn group_occurrences(observations: Vec<Record>) -> ReleaseResult<ObservationJoin> {
    let occurrence_fields = CombineFields::new(OCCURRENCE_FIELDS);
    let mut slots: HashMap<JoinKey, usize> = HashMap::new();
    let mut occurrences: Vec<Occurrence> = Vec::new();
    let mut dropped = 0usize;

    for observation in observations {
        let Some(key) = occurrence_key().extract(&observation) else {
            dropped += 1;
            continue;
        };
        let (fields, observation, consequences) = split_observation(observation);
        let mutation_id = fields.text("_mutation_id").unwrap_or_default();
        let candidates = consequences
            .into_iter()
            .filter_map(Record::from_value)
            .map(|payload| ConsequenceCandidate::from_record(mutation_id.clone(), payload));

        match slots.get(&key) {
            Some(&slot) => {
                let occurrence = &mut occurrences[slot];
                let existing = std::mem::take(&mut occurrence.fields);
                occurrence.fields = merge_records(existing, fields, &occurrence_fields)?;
                occurrence.observations.push(observation.into_value());
                occurrence.candidates.extend(candidates);
            }
            None => {
                slots.insert(key, occurrences.len());
                occurrences.push(Occurrence {
                    fields,
                    observations: vec![observation.into_value()],
                    candidates: candidates.collect(),
                });
            }
        }
    }

    if dropped > 0 {
        debug!(dropped, "Dropped observations without donor or mutation id");
    }

    let mut tallies = Tallies::new();
    let occurrences: Vec<Record> = occurrences
        .into_iter()
        .map(|occurrence| {
            let consequences = aggregate(occurrence.candidates);
            let tally = MutationTally::of_occurrence(occurrence.observations.len(), &consequences);
            let mut record = occurrence.fields;
            if let Some(mutation_id) = record.text("_mutation_id") {
                tallies.record(mutation_id, tally);
            }
            if !consequences.is_empty() {
                let values = consequences
                    .into_iter()
                    .map(|candidate| candidate.payload.into_value())
                    .collect();
                record.insert(CONSEQUENCE, Value::Array(values));
            }
            record.insert(OBSERVATION, Value::Array(occurrence.observations));
            record
        })
        .collect();

    Ok(ObservationJoin {
        occurrences,
        tallies,
    })
}

/// Split an observation into occurrence fields, observation fields and its
/// consequence records
fn split_observation(observation: Record) -> (Record, Record, Vec<Value>) {
    let mut fields = Record::new();
    let mut rest = Record::new();
    let mut consequences = Vec::new();

    for (field, value) in observation.into_map() {
        if field == CONSEQUENCE {
            if let Value::Array(items) = value {
                consequences = items;
            }
        } else if OCCURRENCE_FIELDS.contains(&field.as_str()) {
            fields.insert(field, value);
        } else {
            rest.insert(field, value);
        }
    }
    if !fields.contains("_type") {
        fields.insert("_type", SSM_TYPE);
    }
    (fields, rest, consequences)
}
