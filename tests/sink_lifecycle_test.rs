//! Writer lifecycle guarantees of document stages

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use genome_release::broadcast::{BroadcastTable, BroadcastType, Broadcasts};
use genome_release::document::{Document, DocumentType, DocumentTypeRegistry};
use genome_release::model::Record;
use genome_release::pipeline::DocumentStage;
use genome_release::sink::{DocumentWriter, WriterFactory};
use genome_release::{ReleaseError, ReleaseResult};

#[derive(Debug, Default)]
struct Events {
    opened: Vec<usize>,
    written: Vec<String>,
    closed: Vec<usize>,
}

#[derive(Clone, Default)]
struct TrackingFactory {
    events: Arc<Mutex<Events>>,
    reject: Option<&'static str>,
    fail_close: bool,
}

struct TrackingWriter {
    partition: usize,
    factory: TrackingFactory,
}

#[async_trait]
impl DocumentWriter for TrackingWriter {
    async fn write(&mut self, document: Document) -> ReleaseResult<()> {
        if self.factory.reject == Some(document.id.as_str()) {
            return Err(ReleaseError::sink(format!("bulk request rejected {}", document.id)));
        }
        self.factory.events.lock().unwrap().written.push(document.id);
        Ok(())
    }

    async fn close(&mut self) -> ReleaseResult<()> {
        self.factory.events.lock().unwrap().closed.push(self.partition);
        if self.factory.fail_close {
            return Err(ReleaseError::sink("socket closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl WriterFactory for TrackingFactory {
    async fn create(&self, partition: usize) -> ReleaseResult<Box<dyn DocumentWriter>> {
        self.events.lock().unwrap().opened.push(partition);
        Ok(Box::new(TrackingWriter {
            partition,
            factory: self.clone(),
        }))
    }
}

fn gene(id: &str) -> Record {
    Record::from_value(json!({"_gene_id": id, "symbol": id, "donor": [{"_donor_id": "DO1"}]})).unwrap()
}

fn stage(factory: &TrackingFactory) -> Result<DocumentStage> {
    let registry = DocumentTypeRegistry::build(&HashMap::new())?;
    Ok(DocumentStage::new(
        &registry,
        DocumentType::Gene,
        Arc::new(Broadcasts::new()),
        Arc::new(factory.clone()),
    )?)
}

#[tokio::test]
async fn test_empty_partitions_never_open_writers() -> Result<()> {
    let factory = TrackingFactory::default();
    let report = stage(&factory)?.run(vec![vec![], vec![gene("G1")], vec![]]).await?;

    assert_eq!(report.documents, 1);
    let events = factory.events.lock().unwrap();
    assert_eq!(events.opened, vec![1]);
    assert_eq!(events.closed, vec![1]);
    Ok(())
}

#[tokio::test]
async fn test_failed_write_closes_writer_and_surfaces_error() -> Result<()> {
    let factory = TrackingFactory {
        reject: Some("G2"),
        fail_close: true,
        ..Default::default()
    };
    let err = stage(&factory)?
        .run(vec![vec![gene("G1"), gene("G2"), gene("G3")]])
        .await
        .unwrap_err();

    assert!(matches!(err, ReleaseError::Partition { partition: 0, .. }));
    let message = err.to_string();
    assert!(message.contains("gene"));
    assert!(message.contains("partition 0"));
    assert!(message.contains("bulk request rejected G2"));
    assert!(!message.contains("socket closed"));

    let events = factory.events.lock().unwrap();
    assert_eq!(events.written, vec!["G1"]);
    assert_eq!(events.closed, vec![0]);
    Ok(())
}

#[tokio::test]
async fn test_close_failure_keeps_successful_partition() -> Result<()> {
    let factory = TrackingFactory {
        fail_close: true,
        ..Default::default()
    };
    let report = stage(&factory)?.run(vec![vec![gene("G1"), gene("G2")]]).await?;

    assert_eq!(report.documents, 2);
    assert_eq!(factory.events.lock().unwrap().closed, vec![0]);
    Ok(())
}

#[tokio::test]
async fn test_projection_applies_before_writing() -> Result<()> {
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<Document>>>);

    struct CaptureWriter(Capture);

    #[async_trait]
    impl DocumentWriter for CaptureWriter {
        async fn write(&mut self, document: Document) -> ReleaseResult<()> {
            self.0 .0.lock().unwrap().push(document);
            Ok(())
        }

        async fn close(&mut self) -> ReleaseResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl WriterFactory for Capture {
        async fn create(&self, _partition: usize) -> ReleaseResult<Box<dyn DocumentWriter>> {
            Ok(Box::new(CaptureWriter(self.clone())))
        }
    }

    let capture = Capture::default();
    let registry = DocumentTypeRegistry::build(&HashMap::new())?;
    let stage = DocumentStage::new(
        &registry,
        DocumentType::Gene,
        Arc::new(Broadcasts::new()),
        Arc::new(capture.clone()),
    )?;
    stage.run(vec![vec![gene("G1")]]).await?;

    let documents = capture.0.lock().unwrap();
    assert_eq!(documents[0].id, "G1");
    assert!(!documents[0].payload.contains("donor"));
    Ok(())
}

#[test]
fn test_missing_broadcast_aborts_before_any_partition() -> Result<()> {
    let factory = TrackingFactory::default();
    let registry = DocumentTypeRegistry::build(&HashMap::new())?;
    let broadcasts = Broadcasts::new().with_table(BroadcastTable::build(BroadcastType::Donor, Vec::new()));

    let err = DocumentStage::new(
        &registry,
        DocumentType::GeneCentric,
        Arc::new(broadcasts),
        Arc::new(factory.clone()),
    )
    .err()
    .expect("gene-centric requires the project broadcast");

    assert!(err.is_fatal_startup());
    assert!(err.to_string().contains("project"));
    assert!(factory.events.lock().unwrap().opened.is_empty());
    Ok(())
}
