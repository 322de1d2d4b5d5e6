use serde::{Deserialize, Serialize};
use std::fmt;

/// Collections a release reads from or assembles documents over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseCollection {
    Project,
    Donor,
    Specimen,
    Sample,
    RawSequenceData,
    Therapy,
    Family,
    Exposure,
    Gene,
    GeneSet,
    Observation,
    Mutation,
    Release,
    Diagram,
}

impl ReleaseCollection {
    pub const ALL: [ReleaseCollection; 14] = [
        Self::Project,
        Self::Donor,
        Self::Specimen,
        Self::Sample,
        Self::RawSequenceData,
        Self::Therapy,
        Self::Family,
        Self::Exposure,
        Self::Gene,
        Self::GeneSet,
        Self::Observation,
        Self::Mutation,
        Self::Release,
        Self::Diagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Donor => "donor",
            Self::Specimen => "specimen",
            Self::Sample => "sample",
            Self::RawSequenceData => "raw_sequence_data",
            Self::Therapy => "therapy",
            Self::Family => "family",
            Self::Exposure => "exposure",
            Self::Gene => "gene",
            Self::GeneSet => "gene_set",
            Self::Observation => "observation",
            Self::Mutation => "mutation",
            Self::Release => "release",
            Self::Diagram => "diagram",
        }
    }

    /// Surrogate id field carried by records of this collection
    pub fn id_field(&self) -> &'static str {
        match self {
            Self::Project => "_project_id",
            Self::Donor => "_donor_id",
            Self::Specimen => "_specimen_id",
            Self::Sample => "_sample_id",
            Self::RawSequenceData => "raw_data_accession",
            Self::Therapy | Self::Family | Self::Exposure => "donor_id",
            Self::Gene => "_gene_id",
            Self::GeneSet => "id",
            Self::Observation => "observation_id",
            Self::Mutation => "_mutation_id",
            Self::Release => "_release_id",
            Self::Diagram => "diagram_id",
        }
    }
}

impl fmt::Display for ReleaseCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
