//! Partitioned stage execution
//!
//! Partitions run independently as tokio tasks. They share nothing but
//! read-only broadcast tables, so a failing partition cannot disturb the
//! others. Every partition runs to completion; the stage then reports the
//! failure of the lowest failing partition, or the reduced report.

use futures::stream;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use stillwater::Semigroup;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::broadcast::Broadcasts;
use crate::document::{DocumentAssembler, DocumentType, DocumentTypeRegistry};
use crate::error::{ReleaseError, ReleaseResult};
use crate::model::{KeyExtractor, Record};
use crate::sink::{write_partition, WriterFactory};

/// Totals of a document stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub partitions: usize,
    pub records: u64,
    pub documents: u64,
    /// Records that produced no document
    pub skipped: u64,
}

impl Semigroup for StageReport {
    fn combine(self, other: Self) -> Self {
        Self {
            partitions: self.partitions.saturating_add(other.partitions),
            records: self.records.saturating_add(other.records),
            documents: self.documents.saturating_add(other.documents),
            skipped: self.skipped.saturating_add(other.skipped),
        }
    }
}

/// Assembles and writes one document type over partitioned records
pub struct DocumentStage {
    assembler: Arc<DocumentAssembler>,
    factory: Arc<dyn WriterFactory>,
}

impl DocumentStage {
    /// Fails before any partition runs when a required broadcast is absent
    pub fn new(
        registry: &DocumentTypeRegistry,
        document_type: DocumentType,
        broadcasts: Arc<Broadcasts>,
        factory: Arc<dyn WriterFactory>,
    ) -> ReleaseResult<Self> {
        let spec = registry
            .get(document_type)
            .cloned()
            .ok_or_else(|| ReleaseError::config(format!("no registry entry for '{document_type}'")))?;
        let assembler = DocumentAssembler::new(spec, broadcasts)?;
        Ok(Self {
            assembler: Arc::new(assembler),
            factory,
        })
    }

    pub fn document_type(&self) -> DocumentType {
        self.assembler.spec().document_type
    }

    pub async fn run(&self, partitions: Vec<Vec<Record>>) -> ReleaseResult<StageReport> {
        let document_type = self.document_type();
        info!(%document_type, partitions = partitions.len(), "Starting document stage");

        let mut tasks = JoinSet::new();
        for (partition, records) in partitions.into_iter().enumerate() {
            let assembler = Arc::clone(&self.assembler);
            let factory = Arc::clone(&self.factory);
            tasks.spawn(async move {
                let outcome = run_partition(partition, records, &assembler, factory.as_ref()).await;
                (partition, outcome)
            });
        }

        let report = collect(document_type.as_str(), &mut tasks).await?;
        info!(
            %document_type,
            documents = report.documents,
            skipped = report.skipped,
            "Document stage finished"
        );
        Ok(report)
    }
}

async fn run_partition(
    partition: usize,
    records: Vec<Record>,
    assembler: &DocumentAssembler,
    factory: &dyn WriterFactory,
) -> ReleaseResult<StageReport> {
    let records_in = records.len() as u64;
    let documents = stream::iter(
        records
            .into_iter()
            .filter_map(|record| assembler.assemble(&record))
            .map(Ok),
    );

    let written = write_partition(
        partition,
        documents,
        factory,
        assembler.spec().status_interval,
    )
    .await?;

    Ok(StageReport {
        partitions: 1,
        records: records_in,
        documents: written.documents,
        skipped: records_in.saturating_sub(written.documents),
    })
}

/// Run a synchronous task per partition on the blocking pool, returning
/// results in partition order
pub async fn run_partitions<T, R, F>(name: &str, inputs: Vec<T>, task: F) -> ReleaseResult<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> ReleaseResult<R> + Send + Sync + 'static,
{
    let task = Arc::new(task);
    let mut tasks = JoinSet::new();
    for (partition, input) in inputs.into_iter().enumerate() {
        let task = Arc::clone(&task);
        tasks.spawn_blocking(move || (partition, task(input)));
    }

    let mut results: Vec<(usize, R)> = Vec::new();
    let mut failure: Option<(usize, ReleaseError)> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((partition, Ok(result))) => results.push((partition, result)),
            Ok((partition, Err(e))) => {
                error!(task = name, partition, error = %e, "Partition failed");
                keep_lowest(&mut failure, partition, e);
            }
            Err(e) => return Err(ReleaseError::data(format!("{name} task aborted: {e}"))),
        }
    }

    if let Some((partition, e)) = failure {
        return Err(e.in_partition(name, partition));
    }
    results.sort_by_key(|(partition, _)| *partition);
    Ok(results.into_iter().map(|(_, result)| result).collect())
}

async fn collect(
    name: &str,
    tasks: &mut JoinSet<(usize, ReleaseResult<StageReport>)>,
) -> ReleaseResult<StageReport> {
    let mut report = StageReport::default();
    let mut failure: Option<(usize, ReleaseError)> = None;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(partition_report))) => report = report.combine(partition_report),
            Ok((partition, Err(e))) => {
                error!(document_type = name, partition, error = %e, "Partition failed");
                keep_lowest(&mut failure, partition, e);
            }
            Err(e) => return Err(ReleaseError::sink(format!("{name} partition aborted: {e}"))),
        }
    }

    match failure {
        Some((partition, e)) => Err(e.in_partition(name, partition)),
        None => Ok(report),
    }
}

fn keep_lowest(failure: &mut Option<(usize, ReleaseError)>, partition: usize, error: ReleaseError) {
    let lower = failure.as_ref().map_or(true, |(kept, _)| partition < *kept);
    if lower {
        *failure = Some((partition, error));
    }
}

/// Deterministic hash partitioning. Records without a key land in
/// partition 0.
pub fn partition_by_key<K>(records: Vec<Record>, key: &K, partitions: usize) -> Vec<Vec<Record>>
where
    K: KeyExtractor + ?Sized,
{
    let partitions = partitions.max(1);
    let mut buckets: Vec<Vec<Record>> = (0..partitions).map(|_| Vec::new()).collect();
    for record in records {
        let bucket = key
            .extract(&record)
            .map(|key| {
                let mut hasher = DefaultHasher::new();
                key.values().hash(&mut hasher);
                (hasher.finish() % partitions as u64) as usize
            })
            .unwrap_or(0);
        buckets[bucket].push(record);
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{BroadcastTable, BroadcastType};
    use crate::model::KeyFields;
    use crate::sink::testing::RecordingFactory;
    use serde_json::json;
    use std::collections::HashMap;

    fn registry() -> DocumentTypeRegistry {
        DocumentTypeRegistry::build(&HashMap::new()).unwrap()
    }

    fn project(id: &str) -> Record {
        Record::from_value(json!({"_project_id": id, "project_name": id})).unwrap()
    }

    #[tokio::test]
    async fn test_stage_reduces_partition_reports() {
        let factory = RecordingFactory::default();
        let stage = DocumentStage::new(
            &registry(),
            DocumentType::Project,
            Arc::new(Broadcasts::new()),
            Arc::new(factory.clone()),
        )
        .unwrap();

        let report = stage
            .run(vec![
                vec![project("BRCA-UK"), Record::new().with("project_name", "no id")],
                vec![],
                vec![project("PACA-CA")],
            ])
            .await
            .unwrap();

        assert_eq!(
            report,
            StageReport {
                partitions: 3,
                records: 3,
                documents: 2,
                skipped: 1
            }
        );
        let journal = factory.journal.lock().unwrap();
        let mut created = journal.created.clone();
        created.sort();
        assert_eq!(created, vec![0, 2]);
        assert_eq!(journal.closed, 2);
    }

    #[tokio::test]
    async fn test_partition_failure_names_type_and_partition() {
        let factory = RecordingFactory {
            fail_write_on: Some("PACA-CA".into()),
            ..Default::default()
        };
        let stage = DocumentStage::new(
            &registry(),
            DocumentType::Project,
            Arc::new(Broadcasts::new()),
            Arc::new(factory.clone()),
        )
        .unwrap();

        let err = stage
            .run(vec![vec![project("BRCA-UK")], vec![project("PACA-CA")]])
            .await
            .unwrap_err();
        match err {
            ReleaseError::Partition {
                document_type,
                partition,
                ..
            } => {
                assert_eq!(document_type, "project");
                assert_eq!(partition, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(factory.journal.lock().unwrap().closed, 2);
    }

    #[test]
    fn test_missing_broadcast_aborts_before_running() {
        let broadcasts = Broadcasts::new().with_table(BroadcastTable::build(BroadcastType::Project, Vec::new()));
        let result = DocumentStage::new(
            &registry(),
            DocumentType::DonorCentric,
            Arc::new(broadcasts),
            Arc::new(RecordingFactory::default()),
        );
        assert!(matches!(result, Err(ReleaseError::MissingBroadcast { .. })));
    }

    #[tokio::test]
    async fn test_run_partitions_keeps_order_and_reports_lowest_failure() {
        let doubled = run_partitions("double", vec![1, 2, 3], |n: i32| Ok(n * 2)).await.unwrap();
        assert_eq!(doubled, vec![2, 4, 6]);

        let err = run_partitions("check", vec![1, -1, -2], |n: i32| {
            if n < 0 {
                Err(ReleaseError::data(format!("negative {n}")))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("partition 1"));
        assert!(err.to_string().contains("negative -1"));
    }

    #[test]
    fn test_partitioning_is_deterministic_and_colocates_keys() {
        let records: Vec<Record> = (0..40)
            .map(|i| Record::new().with("_project_id", format!("P{}", i % 5)).with("n", i))
            .collect();
        let key = KeyFields::new(["_project_id"]);
        let first = partition_by_key(records.clone(), &key, 3);
        let second = partition_by_key(records, &key, 3);
        assert_eq!(first, second);
        assert_eq!(first.iter().map(Vec::len).sum::<usize>(), 40);
        for project in ["P0", "P1", "P2", "P3", "P4"] {
            let holding = first
                .iter()
                .filter(|bucket| bucket.iter().any(|r| r.text("_project_id").as_deref() == Some(project)))
                .count();
            assert_eq!(holding, 1);
        }
    }
}
