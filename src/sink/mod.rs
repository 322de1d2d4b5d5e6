//! Document sinks
//!
//! - `search` - batched bulk indexing through a [`search::BulkClient`]
//! - `export` - cell encoding for wide-column export stores
//! - `file` - JSON-lines backends for all of the above
//!
//! A partition owns its writer exclusively. The writer is created on the
//! first document, never for an empty partition, flushed once every document
//! is written, and closed on every path out of [`write_partition`].

pub mod export;
pub mod file;
pub mod search;

pub use export::{
    to_cells, Cell, CellStore, CellStoreProvider, ExportDocumentWriter, ExportStats,
    ExportWriterFactory,
};
pub use file::{JsonLinesDocumentWriter, JsonLinesProvider, JsonLinesWriterFactory};
pub use search::{BulkClient, ClientProvider, SearchDocumentWriter, SearchWriterFactory};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::ReleaseResult;

/// Destination for one partition's documents
#[async_trait]
pub trait DocumentWriter: Send {
    /// Write one document
    async fn write(&mut self, document: Document) -> ReleaseResult<()>;

    /// Persist everything written so far. A failure here fails the partition.
    async fn flush(&mut self) -> ReleaseResult<()> {
        Ok(())
    }

    /// Release the destination
    async fn close(&mut self) -> ReleaseResult<()>;
}

/// Creates a writer per partition
#[async_trait]
pub trait WriterFactory: Send + Sync {
    async fn create(&self, partition: usize) -> ReleaseResult<Box<dyn DocumentWriter>>;
}

/// Outcome of one partition's writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionReport {
    pub partition: usize,
    pub documents: u64,
}

/// Drain `documents` into a lazily created writer.
///
/// Documents are written in arrival order. The first error, from the stream
/// or from the writer, stops the partition. After the last document the
/// writer is flushed and a flush error fails the partition. The writer is
/// closed whether or not writing succeeded; a close failure is logged and
/// never replaces the partition's outcome.
pub async fn write_partition<S>(
    partition: usize,
    documents: S,
    factory: &dyn WriterFactory,
    status_interval: usize,
) -> ReleaseResult<PartitionReport>
where
    S: Stream<Item = ReleaseResult<Document>> + Send,
{
    let mut writer: Option<Box<dyn DocumentWriter>> = None;
    let mut report = PartitionReport {
        partition,
        documents: 0,
    };

    let mut outcome = drain(partition, documents, factory, status_interval, &mut writer, &mut report).await;
    if outcome.is_ok() {
        if let Some(active) = writer.as_mut() {
            outcome = active.flush().await;
        }
    }

    match writer {
        Some(mut writer) => {
            if let Err(e) = writer.close().await {
                warn!(partition, error = %e, "Failed to close document writer");
            }
        }
        None => debug!(partition, "Partition produced no documents"),
    }

    outcome.map(|()| report)
}

async fn drain<S>(
    partition: usize,
    documents: S,
    factory: &dyn WriterFactory,
    status_interval: usize,
    writer: &mut Option<Box<dyn DocumentWriter>>,
    report: &mut PartitionReport,
) -> ReleaseResult<()>
where
    S: Stream<Item = ReleaseResult<Document>> + Send,
{
    let mut documents = Box::pin(documents);

    while let Some(document) = documents.next().await {
        let document = document?;
        if writer.is_none() {
            debug!(partition, "Opening document writer");
            *writer = Some(factory.create(partition).await?);
        }
        if let Some(active) = writer.as_mut() {
            active.write(document).await?;
        }

        report.documents += 1;
        if status_interval > 0 && report.documents % status_interval as u64 == 0 {
            info!(partition, documents = report.documents, "Writing documents");
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording writers shared by sink tests

    use super::*;
    use crate::error::ReleaseError;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct Journal {
        pub created: Vec<usize>,
        pub written: Vec<String>,
        pub flushed: usize,
        pub closed: usize,
    }

    #[derive(Debug, Clone, Default)]
    pub struct RecordingFactory {
        pub journal: Arc<Mutex<Journal>>,
        pub fail_write_on: Option<String>,
        pub fail_flush: bool,
        pub fail_close: bool,
    }

    struct RecordingWriter {
        journal: Arc<Mutex<Journal>>,
        fail_write_on: Option<String>,
        fail_flush: bool,
        fail_close: bool,
    }

    #[async_trait]
    impl DocumentWriter for RecordingWriter {
        async fn write(&mut self, document: Document) -> ReleaseResult<()> {
            if self.fail_write_on.as_deref() == Some(document.id.as_str()) {
                return Err(ReleaseError::sink(format!("rejected {}", document.id)));
            }
            self.journal.lock().unwrap().written.push(document.id);
            Ok(())
        }

        async fn flush(&mut self) -> ReleaseResult<()> {
            self.journal.lock().unwrap().flushed += 1;
            if self.fail_flush {
                return Err(ReleaseError::sink("bulk request timed out"));
            }
            Ok(())
        }

        async fn close(&mut self) -> ReleaseResult<()> {
            self.journal.lock().unwrap().closed += 1;
            if self.fail_close {
                return Err(ReleaseError::sink("connection reset"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl WriterFactory for RecordingFactory {
        async fn create(&self, partition: usize) -> ReleaseResult<Box<dyn DocumentWriter>> {
            self.journal.lock().unwrap().created.push(partition);
            Ok(Box::new(RecordingWriter {
                journal: self.journal.clone(),
                fail_write_on: self.fail_write_on.clone(),
                fail_flush: self.fail_flush,
                fail_close: self.fail_close,
            }))
        }
    }
}
