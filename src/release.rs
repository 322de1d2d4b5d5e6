//! File-backed release runs
//!
//! Collections are read from `<collection>.jsonl` files. The `join` run
//! writes its joined donors and occurrences under `<output>/joined`, which
//! later runs prefer over the raw input.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use stillwater::Semigroup;
use tracing::{debug, info};

use crate::broadcast::{BroadcastTable, BroadcastType, Broadcasts};
use crate::config::ReleaseConfig;
use crate::consequence::Tallies;
use crate::document::{DocumentType, DocumentTypeRegistry, OutputDestination, TypeOverride};
use crate::error::{ReleaseError, ReleaseResult};
use crate::io::{collection_path, read_collection, read_records, write_records};
use crate::join::{
    donor_samples, join_clinical, join_observations, ClinicalCollections, ObservationCollections,
};
use crate::model::{KeyFields, Record, ReleaseCollection};
use crate::pipeline::{partition_by_key, run_partitions, DocumentStage, StageReport};
use crate::sink::{
    ExportWriterFactory, JsonLinesProvider, JsonLinesWriterFactory, SearchWriterFactory,
    WriterFactory,
};

/// Raw observation file names
pub const OBSERVATION_PRIMARY: &str = "ssm_p";
pub const OBSERVATION_META: &str = "ssm_m";
pub const OBSERVATION_SECONDARY: &str = "ssm_s";

const JOINED_DIR: &str = "joined";
const INDEX_DIR: &str = "index";
const EXPORT_DIR: &str = "export";

/// Counts produced by the join run
#[derive(Debug, Clone, Default)]
pub struct JoinSummary {
    pub donors: usize,
    pub occurrences: usize,
    pub tallies: Tallies,
}

pub struct Release {
    config: ReleaseConfig,
}

impl Release {
    pub fn new(config: ReleaseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReleaseConfig {
        &self.config
    }

    /// Validate the registry with configured overrides applied
    pub fn registry(&self) -> ReleaseResult<DocumentTypeRegistry> {
        DocumentTypeRegistry::build(&self.config.type_overrides()?)
    }

    pub fn joined_dir(&self) -> PathBuf {
        self.config.output_dir.join(JOINED_DIR)
    }

    /// Run the clinical and observation joins and write their output
    pub async fn join(&self) -> ReleaseResult<JoinSummary> {
        let partitions = self.config.partitions;
        let input = &self.config.input_dir;

        let mut clinical: Vec<ClinicalCollections> =
            (0..partitions).map(|_| Default::default()).collect();
        let donors = read_collection(input, ReleaseCollection::Donor).await?;
        scatter(&mut clinical, donors, |c, r| c.donors = r);
        let specimens = read_collection(input, ReleaseCollection::Specimen).await?;
        scatter(&mut clinical, specimens, |c, r| c.specimens = r);
        let samples = read_collection(input, ReleaseCollection::Sample).await?;
        scatter(&mut clinical, samples, |c, r| c.samples = r);
        let raw_data = read_collection(input, ReleaseCollection::RawSequenceData).await?;
        scatter(&mut clinical, raw_data, |c, r| c.raw_sequence_data = r);
        let therapy = read_collection(input, ReleaseCollection::Therapy).await?;
        scatter(&mut clinical, therapy, |c, r| c.therapy = r);
        let family = read_collection(input, ReleaseCollection::Family).await?;
        scatter(&mut clinical, family, |c, r| c.family = r);
        let exposure = read_collection(input, ReleaseCollection::Exposure).await?;
        scatter(&mut clinical, exposure, |c, r| c.exposure = r);

        let donors: Vec<Record> = run_partitions("clinical-join", clinical, join_clinical)
            .await?
            .into_iter()
            .flatten()
            .collect();

        let samples = Arc::new(BroadcastTable::build(BroadcastType::Sample, donor_samples(&donors)));
        info!(donors = donors.len(), samples = samples.len(), "Clinical join finished");

        let mut observations: Vec<ObservationCollections> =
            (0..partitions).map(|_| Default::default()).collect();
        let primary = read_records(&collection_path(input, OBSERVATION_PRIMARY)).await?;
        scatter(&mut observations, primary, |c, r| c.primary = r);
        let meta = read_records(&collection_path(input, OBSERVATION_META)).await?;
        scatter(&mut observations, meta, |c, r| c.meta = r);
        let secondary = read_records(&collection_path(input, OBSERVATION_SECONDARY)).await?;
        scatter(&mut observations, secondary, |c, r| c.secondary = r);

        let joined = run_partitions("observation-join", observations, move |collections| {
            join_observations(collections, &samples)
        })
        .await?;

        let mut tallies = Tallies::new();
        let mut occurrences = Vec::new();
        for partition in joined {
            tallies = tallies.combine(partition.tallies);
            occurrences.extend(partition.occurrences);
        }
        let total = tallies.total();
        info!(
            occurrences = occurrences.len(),
            mutations = tallies.len(),
            observations = total.observations,
            affected_genes = total.affected_genes,
            "Observation join finished"
        );

        let out = self.joined_dir();
        write_records(&collection_path(&out, ReleaseCollection::Donor.as_str()), &donors).await?;
        write_records(
            &collection_path(&out, ReleaseCollection::Observation.as_str()),
            &occurrences,
        )
        .await?;

        Ok(JoinSummary {
            donors: donors.len(),
            occurrences: occurrences.len(),
            tallies,
        })
    }

    /// Assemble and write the configured document types
    pub async fn index(&self) -> ReleaseResult<StageReport> {
        let registry = self.registry()?;
        self.run_documents(&registry, &self.config.selected_types()).await
    }

    /// Write donor export cells regardless of the donor type's destination
    pub async fn export(&self) -> ReleaseResult<StageReport> {
        let mut overrides = self.config.type_overrides()?;
        overrides
            .entry(DocumentType::Donor)
            .or_insert_with(TypeOverride::default)
            .destination = Some(OutputDestination::Export);
        let registry = DocumentTypeRegistry::build(&overrides)?;
        self.run_documents(&registry, &[DocumentType::Donor]).await
    }

    async fn run_documents(
        &self,
        registry: &DocumentTypeRegistry,
        types: &[DocumentType],
    ) -> ReleaseResult<StageReport> {
        // Stages resolve their registry entry, writer and broadcast needs
        // before any collection is read.
        let mut plans = Vec::with_capacity(types.len());
        let mut required = BTreeSet::new();
        for document_type in types {
            let spec = registry.get(*document_type).ok_or_else(|| {
                ReleaseError::config(format!("no registry entry for '{document_type}'"))
            })?;
            required.extend(spec.broadcasts.iter().copied());
            plans.push((*document_type, self.factory(registry, *document_type)?));
        }

        let broadcasts = Arc::new(self.broadcasts(&required).await?);
        let mut stages = Vec::with_capacity(plans.len());
        for (document_type, factory) in plans {
            stages.push(DocumentStage::new(
                registry,
                document_type,
                Arc::clone(&broadcasts),
                factory,
            )?);
        }

        let mut total = StageReport::default();
        let mut cache: HashMap<ReleaseCollection, Vec<Record>> = HashMap::new();
        for stage in stages {
            let Some(spec) = registry.get(stage.document_type()) else {
                continue;
            };
            if !cache.contains_key(&spec.collection) {
                let records = self.read(spec.collection).await?;
                cache.insert(spec.collection, records);
            }
            let records = cache.get(&spec.collection).cloned().unwrap_or_default();
            let key = KeyFields::new(spec.id_fields.clone());
            let partitions = partition_by_key(records, &key, self.config.partitions);
            total = total.combine(stage.run(partitions).await?);
        }
        Ok(total)
    }

    fn factory(
        &self,
        registry: &DocumentTypeRegistry,
        document_type: DocumentType,
    ) -> ReleaseResult<Arc<dyn WriterFactory>> {
        let spec = registry.get(document_type).ok_or_else(|| {
            ReleaseError::config(format!("no registry entry for '{document_type}'"))
        })?;
        let out = &self.config.output_dir;
        let name = document_type.as_str();

        Ok(match spec.destination {
            OutputDestination::SearchIndex => Arc::new(SearchWriterFactory::new(
                self.config.index_name.clone(),
                spec.batch_size,
                Arc::new(JsonLinesProvider::new(out.join(INDEX_DIR).join(name))),
            )),
            OutputDestination::Export => Arc::new(ExportWriterFactory::new(Arc::new(
                JsonLinesProvider::new(out.join(EXPORT_DIR).join(name)),
            ))),
            OutputDestination::JsonLines => Arc::new(JsonLinesWriterFactory::new(out.join(name))),
        })
    }

    /// Build the `required` broadcast tables. Only the collections backing
    /// them are read; donors come from the joined output when present.
    pub async fn broadcasts(&self, required: &BTreeSet<BroadcastType>) -> ReleaseResult<Broadcasts> {
        let mut broadcasts = Broadcasts::new();
        if required.contains(&BroadcastType::Project) {
            let projects = self.read(ReleaseCollection::Project).await?;
            broadcasts.insert(BroadcastTable::build(BroadcastType::Project, projects));
        }
        if required.contains(&BroadcastType::Gene) {
            let genes = self.read(ReleaseCollection::Gene).await?;
            broadcasts.insert(BroadcastTable::build(BroadcastType::Gene, genes));
        }
        if required.contains(&BroadcastType::Donor) || required.contains(&BroadcastType::Sample) {
            let donors = self.read(ReleaseCollection::Donor).await?;
            if required.contains(&BroadcastType::Sample) {
                broadcasts.insert(BroadcastTable::build(BroadcastType::Sample, donor_samples(&donors)));
            }
            if required.contains(&BroadcastType::Donor) {
                broadcasts.insert(BroadcastTable::build(BroadcastType::Donor, donors));
            }
        }
        debug!(tables = required.len(), "Built broadcast tables");
        Ok(broadcasts)
    }

    /// Read a collection, preferring joined output over raw input
    async fn read(&self, collection: ReleaseCollection) -> ReleaseResult<Vec<Record>> {
        let joined = collection_path(&self.joined_dir(), collection.as_str());
        if joined.exists() {
            return read_records(&joined).await;
        }
        read_collection(&self.config.input_dir, collection).await
    }
}

fn project_key() -> KeyFields {
    KeyFields::new(["_project_id"])
}

/// Spread records over per-partition collections by project
fn scatter<C, F>(parts: &mut [C], records: Vec<Record>, assign: F)
where
    F: Fn(&mut C, Vec<Record>),
{
    let buckets = partition_by_key(records, &project_key(), parts.len());
    for (part, bucket) in parts.iter_mut().zip(buckets) {
        assign(part, bucket);
    }
}
