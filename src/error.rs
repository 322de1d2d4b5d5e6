//! Error types for the release stage
//!
//! Errors fall into three classes: startup errors that abort the run before
//! any data is read, per-partition data-integrity errors that abort one
//! partition, and sink errors raised while writing documents.

use std::fmt;
use thiserror::Error;

use crate::document::DocumentType;

/// Result type for release operations
pub type ReleaseResult<T> = Result<T, ReleaseError>;

#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The document type registry failed validation; every problem is listed.
    #[error("Registry validation failed: {}", .0.join("; "))]
    Registry(Vec<String>),

    #[error("Missing broadcast '{broadcast}' required by document type '{document_type}'")]
    MissingBroadcast {
        document_type: DocumentType,
        broadcast: String,
    },

    /// Records expected to share a key disagree on a declared key field.
    #[error("Key mismatch on field '{field}': '{left}' != '{right}'")]
    KeyMismatch {
        field: String,
        left: String,
        right: String,
    },

    #[error("Data error: {0}")]
    Data(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Document type '{document_type}' failed in partition {partition}: {source}")]
    Partition {
        document_type: String,
        partition: usize,
        #[source]
        source: Box<ReleaseError>,
    },
}

impl ReleaseError {
    pub fn config<E: fmt::Display>(msg: E) -> Self {
        Self::Config(msg.to_string())
    }

    pub fn data<E: fmt::Display>(msg: E) -> Self {
        Self::Data(msg.to_string())
    }

    pub fn sink<E: fmt::Display>(msg: E) -> Self {
        Self::Sink(msg.to_string())
    }

    /// Attribute an error to the partition and document type it occurred in
    pub fn in_partition(self, document_type: impl fmt::Display, partition: usize) -> Self {
        Self::Partition {
            document_type: document_type.to_string(),
            partition,
            source: Box::new(self),
        }
    }

    /// Errors that must abort the run before any data is read
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            Self::Registry(_) | Self::MissingBroadcast { .. } | Self::Config(_)
        )
    }

    /// Check if this is a data-integrity error
    pub fn is_data_integrity(&self) -> bool {
        match self {
            Self::KeyMismatch { .. } | Self::Data(_) => true,
            Self::Partition { source, .. } => source.is_data_integrity(),
            _ => false,
        }
    }
}
