//! JSON-lines backends
//!
//! Every partition writes its own `part-NNNNN.jsonl` file under a
//! destination directory, so partitions never share a handle.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use super::export::{Cell, CellStore, CellStoreProvider};
use super::search::{BulkAction, BulkClient, ClientProvider};
use super::{DocumentWriter, WriterFactory};
use crate::document::Document;
use crate::error::ReleaseResult;

/// Path of one partition's output file
pub fn part_path(dir: &Path, partition: usize) -> PathBuf {
    dir.join(format!("part-{partition:05}.jsonl"))
}

struct LineWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LineWriter {
    async fn create(dir: &Path, partition: usize) -> ReleaseResult<Self> {
        fs::create_dir_all(dir).await?;
        let path = part_path(dir, partition);
        debug!(path = %path.display(), "Creating output file");
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    async fn write_line<T: Serialize + ?Sized>(&mut self, value: &T) -> ReleaseResult<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&mut self) -> ReleaseResult<()> {
        self.writer.flush().await?;
        self.writer.get_mut().sync_all().await?;
        debug!(path = %self.path.display(), "Flushed output file");
        Ok(())
    }

    async fn close(&mut self) -> ReleaseResult<()> {
        self.writer.shutdown().await?;
        debug!(path = %self.path.display(), "Closed output file");
        Ok(())
    }
}

/// Writes each document payload as one line
pub struct JsonLinesDocumentWriter {
    lines: LineWriter,
}

#[async_trait]
impl DocumentWriter for JsonLinesDocumentWriter {
    async fn write(&mut self, document: Document) -> ReleaseResult<()> {
        self.lines.write_line(&document.payload).await
    }

    async fn flush(&mut self) -> ReleaseResult<()> {
        self.lines.flush().await
    }

    async fn close(&mut self) -> ReleaseResult<()> {
        self.lines.close().await
    }
}

/// Creates [`JsonLinesDocumentWriter`]s under a directory
#[derive(Debug, Clone)]
pub struct JsonLinesWriterFactory {
    dir: PathBuf,
}

impl JsonLinesWriterFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl WriterFactory for JsonLinesWriterFactory {
    async fn create(&self, partition: usize) -> ReleaseResult<Box<dyn DocumentWriter>> {
        let lines = LineWriter::create(&self.dir, partition).await?;
        Ok(Box::new(JsonLinesDocumentWriter { lines }))
    }
}

/// Bulk client writing action and payload line pairs
pub struct JsonLinesBulkClient {
    lines: LineWriter,
}

#[async_trait]
impl BulkClient for JsonLinesBulkClient {
    async fn bulk(&mut self, index: &str, documents: Vec<Document>) -> ReleaseResult<()> {
        for document in &documents {
            let action = BulkAction {
                index,
                document_type: document.document_type,
                id: &document.id,
            };
            self.lines.write_line(&serde_json::json!({ "index": action })).await?;
            self.lines.write_line(&document.payload).await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> ReleaseResult<()> {
        self.lines.flush().await
    }

    async fn close(&mut self) -> ReleaseResult<()> {
        self.lines.close().await
    }
}

/// Cell store writing one cell per line
pub struct JsonLinesCellStore {
    lines: LineWriter,
}

#[async_trait]
impl CellStore for JsonLinesCellStore {
    async fn put(&mut self, cells: Vec<Cell>) -> ReleaseResult<()> {
        for cell in &cells {
            self.lines.write_line(cell).await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> ReleaseResult<()> {
        self.lines.flush().await
    }

    async fn close(&mut self) -> ReleaseResult<()> {
        self.lines.close().await
    }
}

/// Opens JSON-lines clients and stores under a directory
#[derive(Debug, Clone)]
pub struct JsonLinesProvider {
    dir: PathBuf,
}

impl JsonLinesProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ClientProvider for JsonLinesProvider {
    async fn connect(&self, partition: usize) -> ReleaseResult<Box<dyn BulkClient>> {
        let lines = LineWriter::create(&self.dir, partition).await?;
        Ok(Box::new(JsonLinesBulkClient { lines }))
    }
}

#[async_trait]
impl CellStoreProvider for JsonLinesProvider {
    async fn open(&self, partition: usize) -> ReleaseResult<Box<dyn CellStore>> {
        let lines = LineWriter::create(&self.dir, partition).await?;
        Ok(Box::new(JsonLinesCellStore { lines }))
    }
}
