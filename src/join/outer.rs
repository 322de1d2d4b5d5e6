//! Left-outer join of a primary stream against named secondary streams

use std::collections::HashMap;
use tracing::debug;

use super::combine::{merge_records, CombineFields};
use crate::error::ReleaseResult;
use crate::model::{KeyExtractor, KeyFields, Record};
use serde_json::Value;

/// A secondary stream joined under a logical field name
#[derive(Debug, Clone)]
pub struct Secondary {
    name: String,
    key: KeyFields,
    records: Vec<Record>,
    strip_key: bool,
}

impl Secondary {
    pub fn new(name: impl Into<String>, key: KeyFields, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            key,
            records,
            strip_key: false,
        }
    }

    /// Remove the key fields from matched records before appending them
    pub fn stripping_key(mut self) -> Self {
        self.strip_key = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

struct SecondaryIndex {
    name: String,
    matches: HashMap<Vec<String>, Vec<Record>>,
}

/// Join `primary` against `secondaries`.
///
/// Primary records with no match in any secondary, or without a key, pass
/// through unchanged. Matches are appended in arrival order as an array field
/// named after the secondary. Secondaries sharing a name are sources of the
/// same logical type: the n-th record for a key in a later source is merged
/// under `policy` into the n-th record for that key from earlier sources.
/// Records without a counterpart are kept, so every record of a single source
/// survives.
pub fn join<P, K>(
    primary: P,
    secondaries: Vec<Secondary>,
    key: &K,
    policy: &CombineFields,
) -> ReleaseResult<Vec<Record>>
where
    P: IntoIterator<Item = Record>,
    K: KeyExtractor + ?Sized,
{
    let indexes = index_secondaries(secondaries, policy)?;

    let joined = primary
        .into_iter()
        .map(|record| match key.extract(&record) {
            Some(join_key) => attach(record, &join_key.values(), &indexes),
            None => record,
        })
        .collect();

    Ok(joined)
}

fn index_secondaries(
    secondaries: Vec<Secondary>,
    policy: &CombineFields,
) -> ReleaseResult<Vec<SecondaryIndex>> {
    let mut grouped: Vec<(String, KeyFields, bool, Vec<Vec<Record>>)> = Vec::new();
    for secondary in secondaries {
        match grouped.iter_mut().find(|(name, ..)| *name == secondary.name) {
            Some((_, _, _, sources)) => sources.push(secondary.records),
            None => grouped.push((
                secondary.name,
                secondary.key,
                secondary.strip_key,
                vec![secondary.records],
            )),
        }
    }

    grouped
        .into_iter()
        .map(|(name, key, strip_key, sources)| {
            let mut matches: HashMap<Vec<String>, Vec<Record>> = HashMap::new();
            let mut dropped = 0usize;
            for records in sources {
                let mut positions: HashMap<Vec<String>, usize> = HashMap::new();
                for record in records {
                    let Some(join_key) = key.extract(&record) else {
                        dropped += 1;
                        continue;
                    };
                    let values = join_key.values();
                    let position = positions.entry(values.clone()).or_insert(0);
                    let slot = matches.entry(values).or_default();
                    match slot.get_mut(*position) {
                        Some(existing) => {
                            let earlier = std::mem::take(existing);
                            *existing = merge_records(earlier, record, policy)?;
                        }
                        None => slot.push(record),
                    }
                    *position += 1;
                }
            }
            if dropped > 0 {
                debug!(secondary = %name, dropped, "Dropped secondary records without a join key");
            }
            if strip_key {
                for record in matches.values_mut().flatten() {
                    *record = key.strip(std::mem::take(record));
                }
            }

            Ok(SecondaryIndex { name, matches })
        })
        .collect()
}

fn attach(mut record: Record, key: &[String], indexes: &[SecondaryIndex]) -> Record {
    for index in indexes {
        let Some(matches) = index.matches.get(key) else {
            continue;
        };
        let mut values: Vec<Value> = match record.remove(&index.name) {
            Some(Value::Array(existing)) => existing,
            Some(other) => vec![other],
            None => Vec::new(),
        };
        values.extend(matches.iter().cloned().map(Record::into_value));
        record.insert(index.name.clone(), Value::Array(values));
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn observation_key() -> KeyFields {
        KeyFields::new(["observation_id"])
    }

    #[test]
    fn test_unmatched_primary_passes_through_unchanged() {
        let primary = vec![record(json!({"observation_id": "O9", "platform": "Illumina"}))];
        let secondary = Secondary::new(
            "consequence",
            observation_key(),
            vec![record(json!({"observation_id": "O1", "consequence_type": "stop_lost"}))],
        );

        let joined = join(primary.clone(), vec![secondary], &observation_key(), &CombineFields::none()).unwrap();
        assert_eq!(joined, primary);
    }

    #[test]
    fn test_matches_append_in_arrival_order() {
        let primary = vec![record(json!({"observation_id": "O1"}))];
        let secondary = Secondary::new(
            "consequence",
            observation_key(),
            vec![
                record(json!({"observation_id": "O1", "consequence_type": "stop_lost"})),
                record(json!({"consequence_type": "orphan"})),
                record(json!({"observation_id": "O1", "consequence_type": "intron_variant"})),
            ],
        )
        .stripping_key();

        let joined = join(primary, vec![secondary], &observation_key(), &CombineFields::none()).unwrap();
        assert_eq!(
            joined[0].get("consequence").unwrap(),
            &json!([{"consequence_type": "stop_lost"}, {"consequence_type": "intron_variant"}])
        );
    }

    #[test]
    fn test_compound_key_join() {
        let primary = vec![record(json!({"_project_id": "P", "specimen_id": "SP1"}))];
        let samples = Secondary::new(
            "sample",
            KeyFields::new(["_project_id", "specimen_id"]),
            vec![record(json!({"_project_id": "P", "specimen_id": "SP1", "analyzed_sample_id": "ASID1"}))],
        );
        let joined = join(
            primary,
            vec![samples],
            &KeyFields::new(["_project_id", "specimen_id"]),
            &CombineFields::none(),
        )
        .unwrap();
        assert_eq!(joined[0].array("sample").len(), 1);
    }

    #[test]
    fn test_same_named_sources_are_combined_first() {
        let primary = vec![record(json!({"observation_id": "O1"}))];
        let first = Secondary::new(
            "consequence",
            observation_key(),
            vec![record(json!({"observation_id": "O1", "gene_affected": "G1", "note": null}))],
        );
        let second = Secondary::new(
            "consequence",
            observation_key(),
            vec![record(json!({"observation_id": "O1", "gene_affected": "G2", "note": "n"}))],
        );

        let joined = join(
            primary,
            vec![first, second],
            &observation_key(),
            &CombineFields::new(["observation_id"]),
        )
        .unwrap();
        let consequences = joined[0].array("consequence");
        assert_eq!(consequences.len(), 1);
        assert_eq!(consequences[0], json!({"observation_id": "O1", "gene_affected": "G1", "note": "n"}));
    }

    #[test]
    fn test_empty_extra_source_keeps_every_match() {
        let primary = vec![record(json!({"observation_id": "O1"}))];
        let annotated = vec![
            record(json!({"observation_id": "O1", "_transcript_id": "T1"})),
            record(json!({"observation_id": "O1", "_transcript_id": "T2"})),
        ];
        let policy = CombineFields::new(["observation_id"]);

        let single = join(
            primary.clone(),
            vec![Secondary::new("consequence", observation_key(), annotated.clone())],
            &observation_key(),
            &policy,
        )
        .unwrap();
        let with_empty = join(
            primary,
            vec![
                Secondary::new("consequence", observation_key(), annotated),
                Secondary::new("consequence", observation_key(), Vec::new()),
            ],
            &observation_key(),
            &policy,
        )
        .unwrap();

        assert_eq!(single[0].array("consequence").len(), 2);
        assert_eq!(with_empty, single);
    }

    #[test]
    fn test_sources_pair_matches_by_position() {
        let primary = vec![record(json!({"observation_id": "O1"}))];
        let first = Secondary::new(
            "consequence",
            observation_key(),
            vec![
                record(json!({"observation_id": "O1", "_transcript_id": "T1", "gene_affected": null})),
                record(json!({"observation_id": "O1", "_transcript_id": "T2"})),
            ],
        );
        let second = Secondary::new(
            "consequence",
            observation_key(),
            vec![record(json!({"observation_id": "O1", "_transcript_id": "T9", "gene_affected": "G1"}))],
        );

        let joined = join(
            primary,
            vec![first, second],
            &observation_key(),
            &CombineFields::new(["observation_id"]),
        )
        .unwrap();
        assert_eq!(
            joined[0].get("consequence").unwrap(),
            &json!([
                {"observation_id": "O1", "_transcript_id": "T1", "gene_affected": "G1"},
                {"observation_id": "O1", "_transcript_id": "T2"}
            ])
        );
    }
}
