//! Document types, field projection and assembly
//!
//! - `fields` - per-collection include/exclude path lists
//! - `projector` - compiled projections applied to record trees
//! - `registry` - the closed table of document type specs
//! - `transform` - assembly of projected documents from joined records

pub mod fields;
pub mod projector;
pub mod registry;
pub mod transform;

pub use fields::{CollectionFields, DocumentFields};
pub use projector::FieldProjection;
pub use registry::{
    DocumentClassifier, DocumentTypeEntry, DocumentTypeRegistry, DocumentTypeSpec,
    OutputDestination, TypeOverride, DOCUMENT_TYPES,
};
pub use transform::DocumentAssembler;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ReleaseError;
use crate::model::Record;

/// The closed set of document types a release produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Diagram,
    Release,
    GeneSet,
    GeneSetText,
    Project,
    ProjectText,
    Donor,
    DonorText,
    DonorCentric,
    Gene,
    GeneText,
    GeneCentric,
    ObservationCentric,
    MutationText,
    MutationCentric,
}

impl DocumentType {
    pub const ALL: [DocumentType; 15] = [
        Self::Diagram,
        Self::Release,
        Self::GeneSet,
        Self::GeneSetText,
        Self::Project,
        Self::ProjectText,
        Self::Donor,
        Self::DonorText,
        Self::DonorCentric,
        Self::Gene,
        Self::GeneText,
        Self::GeneCentric,
        Self::ObservationCentric,
        Self::MutationText,
        Self::MutationCentric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diagram => "diagram",
            Self::Release => "release",
            Self::GeneSet => "gene-set",
            Self::GeneSetText => "gene-set-text",
            Self::Project => "project",
            Self::ProjectText => "project-text",
            Self::Donor => "donor",
            Self::DonorText => "donor-text",
            Self::DonorCentric => "donor-centric",
            Self::Gene => "gene",
            Self::GeneText => "gene-text",
            Self::GeneCentric => "gene-centric",
            Self::ObservationCentric => "observation-centric",
            Self::MutationText => "mutation-text",
            Self::MutationCentric => "mutation-centric",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|document_type| document_type.as_str() == s)
            .copied()
            .ok_or_else(|| ReleaseError::config(format!("unknown document type '{s}'")))
    }
}

/// A projected document ready for a sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub document_type: DocumentType,
    pub id: String,
    pub payload: Record,
}

impl Document {
    pub fn new(document_type: DocumentType, id: impl Into<String>, payload: Record) -> Self {
        Self {
            document_type,
            id: id.into(),
            payload,
        }
    }
}
