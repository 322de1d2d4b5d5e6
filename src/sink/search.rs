//! Search index sink

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::{DocumentWriter, WriterFactory};
use crate::document::{Document, DocumentType};
use crate::error::ReleaseResult;

/// Action line preceding each payload in a bulk request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkAction<'a> {
    #[serde(rename = "_index")]
    pub index: &'a str,
    #[serde(rename = "_type")]
    pub document_type: DocumentType,
    #[serde(rename = "_id")]
    pub id: &'a str,
}

/// Connection to a search cluster's bulk API
#[async_trait]
pub trait BulkClient: Send {
    async fn bulk(&mut self, index: &str, documents: Vec<Document>) -> ReleaseResult<()>;

    /// Wait until every submitted request is durable
    async fn flush(&mut self) -> ReleaseResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> ReleaseResult<()>;
}

/// Opens one client per partition
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn connect(&self, partition: usize) -> ReleaseResult<Box<dyn BulkClient>>;
}

/// Buffers documents and submits them in batches
pub struct SearchDocumentWriter {
    index: String,
    batch_size: usize,
    buffer: Vec<Document>,
    client: Box<dyn BulkClient>,
}

impl SearchDocumentWriter {
    pub fn new(index: impl Into<String>, batch_size: usize, client: Box<dyn BulkClient>) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            index: index.into(),
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            client,
        }
    }

    async fn submit(&mut self) -> ReleaseResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        debug!(index = %self.index, documents = batch.len(), "Submitting bulk request");
        self.client.bulk(&self.index, batch).await
    }
}

#[async_trait]
impl DocumentWriter for SearchDocumentWriter {
    async fn write(&mut self, document: Document) -> ReleaseResult<()> {
        self.buffer.push(document);
        if self.buffer.len() >= self.batch_size {
            self.submit().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> ReleaseResult<()> {
        self.submit().await?;
        self.client.flush().await
    }

    async fn close(&mut self) -> ReleaseResult<()> {
        if !self.buffer.is_empty() {
            debug!(index = %self.index, documents = self.buffer.len(), "Discarding unsubmitted documents");
        }
        self.client.close().await
    }
}

pub struct SearchWriterFactory {
    index: String,
    batch_size: usize,
    provider: Arc<dyn ClientProvider>,
}

impl SearchWriterFactory {
    pub fn new(index: impl Into<String>, batch_size: usize, provider: Arc<dyn ClientProvider>) -> Self {
        Self {
            index: index.into(),
            batch_size,
            provider,
        }
    }
}

#[async_trait]
impl WriterFactory for SearchWriterFactory {
    async fn create(&self, partition: usize) -> ReleaseResult<Box<dyn DocumentWriter>> {
        let client = self.provider.connect(partition).await?;
        Ok(Box::new(SearchDocumentWriter::new(
            self.index.clone(),
            self.batch_size,
            client,
        )))
    }
}
