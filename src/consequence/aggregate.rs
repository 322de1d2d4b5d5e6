//! Most-severe consequence selection and running tallies
//!
//! Candidates are grouped by (mutation, transcript). Each group keeps its
//! highest-ranked candidate, ties going to the one seen first. Groups made up
//! only of unknown consequences are suppressed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use stillwater::Semigroup;

use super::Severity;
use crate::model::Record;

/// Field naming the consequence type of a consequence record
pub const CONSEQUENCE_TYPE_FIELD: &str = "consequence_type";

/// A candidate functional-impact annotation
#[derive(Debug, Clone, PartialEq)]
pub struct ConsequenceCandidate {
    pub mutation_id: String,
    pub transcript_id: String,
    pub severity: Severity,
    pub payload: Record,
}

impl ConsequenceCandidate {
    /// Build a candidate from a consequence record. The transcript comes from
    /// `_transcript_id`, falling back to `transcript_affected`.
    pub fn from_record(mutation_id: impl Into<String>, payload: Record) -> Self {
        let transcript_id = payload
            .text("_transcript_id")
            .or_else(|| payload.text("transcript_affected"))
            .unwrap_or_default();
        let severity = payload
            .text(CONSEQUENCE_TYPE_FIELD)
            .map(|name| Severity::of(&name))
            .unwrap_or(Severity::UNKNOWN);

        Self {
            mutation_id: mutation_id.into(),
            transcript_id,
            severity,
            payload,
        }
    }

    pub fn gene_id(&self) -> Option<String> {
        self.payload.text("_gene_id")
    }
}

/// Keep the most severe candidate per (mutation, transcript).
///
/// Output follows the first-seen order of each group.
pub fn aggregate(candidates: Vec<ConsequenceCandidate>) -> Vec<ConsequenceCandidate> {
    let mut slots: HashMap<(String, String), usize> = HashMap::new();
    let mut selected: Vec<ConsequenceCandidate> = Vec::new();

    for candidate in candidates {
        let group = (candidate.mutation_id.clone(), candidate.transcript_id.clone());
        match slots.get(&group) {
            Some(&slot) => {
                if candidate.severity > selected[slot].severity {
                    selected[slot] = candidate;
                }
            }
            None => {
                slots.insert(group, selected.len());
                selected.push(candidate);
            }
        }
    }

    selected.retain(|candidate| !candidate.severity.is_unknown());
    selected
}

/// Running counts for one mutation or donor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationTally {
    pub observations: u64,
    pub affected_genes: u64,
}

impl MutationTally {
    /// Tally one occurrence from its observation count and retained consequences
    pub fn of_occurrence(observations: usize, consequences: &[ConsequenceCandidate]) -> Self {
        let genes: BTreeSet<String> = consequences
            .iter()
            .filter_map(ConsequenceCandidate::gene_id)
            .collect();
        Self {
            observations: observations as u64,
            affected_genes: genes.len() as u64,
        }
    }
}

impl Semigroup for MutationTally {
    fn combine(self, other: Self) -> Self {
        Self {
            observations: self.observations.saturating_add(other.observations),
            affected_genes: self.affected_genes.saturating_add(other.affected_genes),
        }
    }
}

/// Tallies keyed by mutation or donor id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tallies(HashMap<String, MutationTally>);

impl Tallies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: impl Into<String>, tally: MutationTally) {
        let entry = self.0.entry(key.into()).or_default();
        *entry = entry.combine(tally);
    }

    pub fn get(&self, key: &str) -> Option<&MutationTally> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum over every key
    pub fn total(&self) -> MutationTally {
        self.0
            .values()
            .fold(MutationTally::default(), |acc, tally| acc.combine(*tally))
    }
}

impl Semigroup for Tallies {
    fn combine(mut self, other: Self) -> Self {
        for (key, tally) in other.0 {
            self.record(key, tally);
        }
        self
    }
}
