//! Consequence severity ranking and aggregation
//!
//! Consequence types are ranked by an explicit table ordered from least to
//! most severe. Names missing from the table resolve to the
//! `unknown_consequence` sentinel, which ranks strictly lowest.

pub mod aggregate;

pub use aggregate::{aggregate, ConsequenceCandidate, MutationTally, Tallies};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the sentinel consequence type
pub const UNKNOWN_CONSEQUENCE: &str = "unknown_consequence";

/// Consequence types ordered by severity, least severe first. The position
/// of a name in this table is its rank.
pub const SEVERITY_ORDER: [&str; 39] = [
    UNKNOWN_CONSEQUENCE,
    "custom",
    "chromosome",
    "intergenic_region",
    "intragenic_variant",
    "gene_variant",
    "transcript_variant",
    "intron_variant",
    "downstream_gene_variant",
    "exon_variant",
    "3_prime_UTR_variant",
    "stop_retained_variant",
    "synonymous_variant",
    "upstream_gene_variant",
    "5_prime_UTR_variant",
    "conserved_intergenic_variant",
    "conserved_intron_variant",
    "miRNA",
    "regulatory_region_variant",
    "inframe_insertion",
    "disruptive_inframe_insertion",
    "inframe_deletion",
    "disruptive_inframe_deletion",
    "non_canonical_start_codon",
    "3_prime_UTR_truncation",
    "5_prime_UTR_truncation",
    "coding_sequence_variant",
    "5_prime_UTR_premature_start_codon_gain_variant",
    "rare_amino_acid_variant",
    "splice_region_variant",
    "splice_donor_variant",
    "splice_acceptor_variant",
    "exon_loss_variant",
    "stop_lost",
    "stop_gained",
    "initiator_codon_variant",
    "start_lost",
    "missense_variant",
    "frameshift_variant",
];

/// Severity rank of a consequence type; higher is more severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Severity(u8);

impl Severity {
    pub const UNKNOWN: Severity = Severity(0);

    /// Rank a consequence name; unrecognized names rank as unknown
    pub fn of(consequence_type: &str) -> Self {
        SEVERITY_ORDER
            .iter()
            .position(|name| *name == consequence_type)
            .map(|rank| Severity(rank as u8))
            .unwrap_or(Self::UNKNOWN)
    }

    pub fn rank(&self) -> u8 {
        self.0
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }

    /// Canonical name of this rank
    pub fn name(&self) -> &'static str {
        SEVERITY_ORDER[self.0 as usize]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
