//! Common test utilities and fixtures

#![allow(dead_code)]

use anyhow::Result;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use genome_release::config::ReleaseConfig;
use genome_release::document::DocumentType;

/// Input and output directories of a file-backed release
pub struct ReleaseFixture {
    temp_dir: TempDir,
}

impl ReleaseFixture {
    pub fn new() -> Result<Self> {
        let fixture = Self {
            temp_dir: TempDir::new()?,
        };
        fs::create_dir_all(fixture.input_dir())?;
        Ok(fixture)
    }

    pub fn input_dir(&self) -> PathBuf {
        self.temp_dir.path().join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.temp_dir.path().join("output")
    }

    /// Write one `<name>.jsonl` input collection
    pub fn with_collection(self, name: &str, records: &[Value]) -> Result<Self> {
        let mut content = String::new();
        for record in records {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }
        fs::write(self.input_dir().join(format!("{name}.jsonl")), content)?;
        Ok(self)
    }

    pub fn config(&self, partitions: usize, document_types: &[DocumentType]) -> ReleaseConfig {
        ReleaseConfig {
            input_dir: self.input_dir(),
            output_dir: self.output_dir(),
            partitions,
            document_types: document_types.to_vec(),
            ..ReleaseConfig::default()
        }
    }
}

/// Every JSON line of every `part-*.jsonl` file under `dir`
pub fn read_parts(dir: &Path) -> Result<Vec<Value>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    paths.sort();

    let mut values = Vec::new();
    for path in paths {
        for line in fs::read_to_string(&path)?.lines() {
            values.push(serde_json::from_str(line)?);
        }
    }
    Ok(values)
}

pub fn read_jsonl(path: &Path) -> Result<Vec<Value>> {
    fs::read_to_string(path)?
        .lines()
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}

/// Two breast cancer donors. DO001 has one specimen, sample, consequence and
/// observation; DO002 has two observations of one mutation from separate
/// analyses of the same sample.
pub fn breast_cancer_release() -> Result<ReleaseFixture> {
    ReleaseFixture::new()?
        .with_collection(
            "project",
            &[json!({"_project_id": "BRCA-UK", "project_name": "Breast Cancer", "primary_site": "Breast"})],
        )?
        .with_collection(
            "donor",
            &[
                json!({"_donor_id": "DO001", "_project_id": "BRCA-UK", "donor_id": "d1", "donor_sex": "female"}),
                json!({"_donor_id": "DO002", "_project_id": "BRCA-UK", "donor_id": "d2", "donor_sex": "male"}),
            ],
        )?
        .with_collection(
            "specimen",
            &[
                json!({"_specimen_id": "SP001", "_project_id": "BRCA-UK", "specimen_id": "s1", "donor_id": "d1"}),
                json!({"_specimen_id": "SP002", "_project_id": "BRCA-UK", "specimen_id": "s2", "donor_id": "d2"}),
            ],
        )?
        .with_collection(
            "sample",
            &[
                json!({"_sample_id": "SA001", "_project_id": "BRCA-UK", "analyzed_sample_id": "a1", "specimen_id": "s1"}),
                json!({"_sample_id": "SA002", "_project_id": "BRCA-UK", "analyzed_sample_id": "a2", "specimen_id": "s2"}),
            ],
        )?
        .with_collection(
            "therapy",
            &[
                json!({"_project_id": "BRCA-UK", "donor_id": "d1", "first_therapy_type": "chemotherapy"}),
                json!({"_project_id": "BRCA-UK", "donor_id": "d2", "first_therapy_type": "surgery"}),
            ],
        )?
        .with_collection(
            "family",
            &[
                json!({"_project_id": "BRCA-UK", "donor_id": "d1", "relationship_type": "sibling"}),
                json!({"_project_id": "BRCA-UK", "donor_id": "d2", "relationship_type": "parent"}),
            ],
        )?
        .with_collection(
            "exposure",
            &[
                json!({"_project_id": "BRCA-UK", "donor_id": "d1", "tobacco_smoking_history_indicator": "1"}),
                json!({"_project_id": "BRCA-UK", "donor_id": "d2", "tobacco_smoking_history_indicator": "2"}),
            ],
        )?
        .with_collection(
            "gene",
            &[
                json!({"_gene_id": "ENSG01", "symbol": "TP53", "biotype": "protein_coding"}),
                json!({"_gene_id": "ENSG02", "symbol": "BRCA2", "biotype": "protein_coding"}),
            ],
        )?
        .with_collection(
            "ssm_p",
            &[
                observation("1", "an1", "a1", "MU1", "17"),
                observation("2", "an2", "a2", "MU2", "13"),
                observation("3", "an3", "a2", "MU2", "13"),
            ],
        )?
        .with_collection(
            "ssm_m",
            &[
                json!({"_project_id": "BRCA-UK", "analysis_id": "an1", "analyzed_sample_id": "a1", "platform": "Illumina HiSeq"}),
                json!({"_project_id": "BRCA-UK", "analysis_id": "an2", "analyzed_sample_id": "a2", "platform": "Illumina HiSeq"}),
                json!({"_project_id": "BRCA-UK", "analysis_id": "an3", "analyzed_sample_id": "a2", "platform": "SOLiD"}),
            ],
        )?
        .with_collection(
            "ssm_s",
            &[
                consequence("1", "ENSG01", "T1", "missense_variant"),
                consequence("2", "ENSG02", "T2", "missense_variant"),
                consequence("3", "ENSG02", "T2", "synonymous_variant"),
            ],
        )
}

fn observation(id: &str, analysis: &str, sample: &str, mutation: &str, chromosome: &str) -> Value {
    json!({
        "_project_id": "BRCA-UK",
        "observation_id": id,
        "analysis_id": analysis,
        "analyzed_sample_id": sample,
        "_mutation_id": mutation,
        "chromosome": chromosome,
        "mutation_type": "single base substitution",
        "total_read_count": 40
    })
}

fn consequence(observation: &str, gene: &str, transcript: &str, consequence_type: &str) -> Value {
    json!({
        "_project_id": "BRCA-UK",
        "observation_id": observation,
        "_gene_id": gene,
        "_transcript_id": transcript,
        "consequence_type": consequence_type
    })
}
