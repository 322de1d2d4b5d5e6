//! Release configuration
//!
//! Loaded from YAML (`.yml`/`.yaml`) or TOML (`.toml`). A missing file
//! yields the defaults.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::document::{DocumentType, TypeOverride};
use crate::error::{ReleaseError, ReleaseResult};

pub const DEFAULT_PARTITIONS: usize = 4;
pub const DEFAULT_INDEX_NAME: &str = "icgc-release";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Directory holding one `<collection>.jsonl` file per collection
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub index_name: String,
    pub partitions: usize,
    /// Types to produce; empty means every type
    pub document_types: Vec<DocumentType>,
    /// Per-type settings keyed by document type name
    pub overrides: BTreeMap<String, TypeOverride>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            partitions: DEFAULT_PARTITIONS,
            document_types: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }
}

impl ReleaseConfig {
    /// Load and validate a configuration file
    pub async fn load(path: &Path) -> ReleaseResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).await?;
        let config = Self::parse(path, &content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(path: &Path, content: &str) -> ReleaseResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yml" | "yaml") => Ok(serde_yaml::from_str(content)?),
            Some("toml") => Ok(toml::from_str(content)?),
            _ => Err(ReleaseError::config(format!(
                "unsupported configuration format: {}",
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> ReleaseResult<()> {
        if self.partitions == 0 {
            return Err(ReleaseError::config("partitions must be positive"));
        }
        if self.index_name.trim().is_empty() {
            return Err(ReleaseError::config("index name must not be empty"));
        }
        self.type_overrides().map(|_| ())
    }

    /// Overrides keyed by parsed document type
    pub fn type_overrides(&self) -> ReleaseResult<HashMap<DocumentType, TypeOverride>> {
        self.overrides
            .iter()
            .map(|(name, settings)| Ok((name.parse::<DocumentType>()?, *settings)))
            .collect()
    }

    pub fn selected_types(&self) -> Vec<DocumentType> {
        if self.document_types.is_empty() {
            DocumentType::ALL.to_vec()
        } else {
            self.document_types.clone()
        }
    }
}
