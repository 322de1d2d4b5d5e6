//! Donor-centric clinical join
//!
//! Builds one nested record per donor: specimens carry their samples, samples
//! carry their raw sequence data, and therapy, family and exposure records hang
//! off the donor. A satellite array appears only when something contributed.

use super::combine::CombineFields;
use super::outer::{join, Secondary};
use crate::error::ReleaseResult;
use crate::model::{KeyFields, Record};

pub const SPECIMEN: &str = "specimen";
pub const SAMPLE: &str = "sample";
pub const RAW_SEQUENCE_DATA: &str = "available_raw_sequence_data";
pub const THERAPY: &str = "therapy";
pub const FAMILY: &str = "family";
pub const EXPOSURE: &str = "exposure";

/// Clinical collections of one partition, colocated by project
#[derive(Debug, Clone, Default)]
pub struct ClinicalCollections {
    pub donors: Vec<Record>,
    pub specimens: Vec<Record>,
    pub samples: Vec<Record>,
    pub raw_sequence_data: Vec<Record>,
    pub therapy: Vec<Record>,
    pub family: Vec<Record>,
    pub exposure: Vec<Record>,
}

fn donor_key() -> KeyFields {
    KeyFields::new(["_project_id", "donor_id"])
}

fn specimen_key() -> KeyFields {
    KeyFields::new(["_project_id", "specimen_id"])
}

fn sample_key() -> KeyFields {
    KeyFields::new(["_project_id", "analyzed_sample_id"])
}

/// Join the clinical collections into donor records
pub fn join_clinical(collections: ClinicalCollections) -> ReleaseResult<Vec<Record>> {
    let ClinicalCollections {
        donors,
        specimens,
        samples,
        raw_sequence_data,
        therapy,
        family,
        exposure,
    } = collections;
    let policy = CombineFields::none();

    let samples = join(
        samples,
        vec![Secondary::new(RAW_SEQUENCE_DATA, sample_key(), raw_sequence_data).stripping_key()],
        &sample_key(),
        &policy,
    )?;

    let specimens = join(
        specimens,
        vec![Secondary::new(SAMPLE, specimen_key(), samples)],
        &specimen_key(),
        &policy,
    )?;

    join(
        donors,
        vec![
            Secondary::new(SPECIMEN, donor_key(), specimens),
            Secondary::new(THERAPY, donor_key(), therapy),
            Secondary::new(FAMILY, donor_key(), family),
            Secondary::new(EXPOSURE, donor_key(), exposure),
        ],
        &donor_key(),
        &policy,
    )
}

/// Flatten joined donors into the records backing the sample broadcast:
/// one per sample, carrying the surrogate ids of its donor and specimen.
pub fn donor_samples(donors: &[Record]) -> Vec<Record> {
    let mut samples = Vec::new();
    for donor in donors {
        for specimen in donor.array(SPECIMEN) {
            let Some(specimen) = specimen.as_object() else {
                continue;
            };
            let specimen = Record::from_map(specimen.clone());
            for sample in specimen.array(SAMPLE) {
                let Some(sample) = sample.as_object().cloned().map(Record::from_map) else {
                    continue;
                };
                let mut entry = Record::new();
                copy_field(&mut entry, "_project_id", donor);
                copy_field(&mut entry, "analyzed_sample_id", &sample);
                copy_field(&mut entry, "_donor_id", donor);
                copy_field(&mut entry, "_specimen_id", &specimen);
                copy_field(&mut entry, "_sample_id", &sample);
                samples.push(entry);
            }
        }
    }
    samples
}

fn copy_field(target: &mut Record, field: &str, source: &Record) {
    if let Some(value) = source.get(field) {
        target.insert(field, value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn test_donor_without_satellites_has_no_arrays() {
        let donors = join_clinical(ClinicalCollections {
            donors: vec![record(json!({"_project_id": "EMPTY", "donor_id": "D1", "_donor_id": "DO9"}))],
            ..Default::default()
        })
        .unwrap();

        assert_eq!(donors.len(), 1);
        for field in [SPECIMEN, THERAPY, FAMILY, EXPOSURE] {
            assert!(!donors[0].contains(field), "unexpected {field}");
        }
    }

    #[test]
    fn test_samples_nest_under_specimens() {
        let donors = join_clinical(ClinicalCollections {
            donors: vec![record(json!({"_project_id": "P", "donor_id": "D1"}))],
            specimens: vec![record(json!({"_project_id": "P", "donor_id": "D1", "specimen_id": "S1"}))],
            samples: vec![
                record(json!({"_project_id": "P", "specimen_id": "S1", "analyzed_sample_id": "ASID1"})),
                record(json!({"_project_id": "P", "specimen_id": "S1", "analyzed_sample_id": "ASID2"})),
            ],
            raw_sequence_data: vec![record(json!({
                "_project_id": "P",
                "analyzed_sample_id": "ASID1",
                "repository": "EGA",
                "raw_data_accession": "EGAS1"
            }))],
            ..Default::default()
        })
        .unwrap();

        let specimens = donors[0].array(SPECIMEN);
        assert_eq!(specimens.len(), 1);
        let samples = specimens[0][SAMPLE].as_array().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(
            samples[0][RAW_SEQUENCE_DATA],
            json!([{"repository": "EGA", "raw_data_accession": "EGAS1"}])
        );
        assert!(samples[1].get(RAW_SEQUENCE_DATA).is_none());
    }

    #[test]
    fn test_donor_samples_carry_surrogate_ids() {
        let donor = record(json!({
            "_project_id": "P",
            "_donor_id": "DO1",
            "specimen": [{
                "_specimen_id": "SP1",
                "sample": [{"analyzed_sample_id": "ASID1", "_sample_id": "SA1"}]
            }]
        }));

        let samples = donor_samples(&[donor]);
        assert_eq!(
            samples,
            vec![record(json!({
                "_project_id": "P",
                "analyzed_sample_id": "ASID1",
                "_donor_id": "DO1",
                "_specimen_id": "SP1",
                "_sample_id": "SA1"
            }))]
        );
    }
}
