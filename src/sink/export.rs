//! Export sink
//!
//! Each document becomes one row of cells. A cell holds one leaf scalar of
//! the payload; its column tag is the leaf's ordinal in depth-first order.
//! Ordinals advance over null and blank leaves even though no cell is
//! emitted for them, so a column always names the same position.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use stillwater::Semigroup;
use tracing::info;

use super::{DocumentWriter, WriterFactory};
use crate::document::Document;
use crate::error::{ReleaseError, ReleaseResult};
use crate::model::scalar_text;

/// Column family of every export cell
pub const EXPORT_FAMILY: &str = "d";

/// Column tags are one byte
pub const MAX_COLUMNS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub row_key: Vec<u8>,
    pub family: String,
    pub column: u8,
    pub timestamp: i64,
    pub value: Vec<u8>,
}

/// Numeric part of an entity id: its trailing digits
pub fn entity_number(id: &str) -> ReleaseResult<u32> {
    let digits_from = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .ok_or_else(|| ReleaseError::data(format!("entity id '{id}' has no numeric part")))?;
    id[digits_from..]
        .parse()
        .map_err(|e| ReleaseError::data(format!("entity id '{id}': {e}")))
}

/// 4-byte entity number followed by the 8-byte row ordinal, both big-endian
pub fn row_key(entity: u32, ordinal: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(12);
    key.extend_from_slice(&entity.to_be_bytes());
    key.extend_from_slice(&ordinal.to_be_bytes());
    key
}

/// Encode a document as a row of cells
pub fn to_cells(document: &Document, ordinal: u64, timestamp: i64) -> ReleaseResult<Vec<Cell>> {
    let entity = entity_number(&document.id)?;
    let key = row_key(entity, ordinal);

    let mut leaves = Vec::new();
    for (_, value) in document.payload.fields() {
        collect_leaves(value, &mut leaves);
    }
    if leaves.len() > MAX_COLUMNS {
        return Err(ReleaseError::data(format!(
            "document '{}' has {} leaf fields, at most {MAX_COLUMNS} fit a row",
            document.id,
            leaves.len()
        )));
    }

    Ok(leaves
        .into_iter()
        .enumerate()
        .filter_map(|(column, value)| {
            let text = scalar_text(value).filter(|text| !text.trim().is_empty())?;
            Some(Cell {
                row_key: key.clone(),
                family: EXPORT_FAMILY.to_string(),
                column: column as u8,
                timestamp,
                value: text.into_bytes(),
            })
        })
        .collect())
}

fn collect_leaves<'a>(value: &'a Value, leaves: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => map.values().for_each(|v| collect_leaves(v, leaves)),
        Value::Array(items) => items.iter().for_each(|v| collect_leaves(v, leaves)),
        scalar => leaves.push(scalar),
    }
}

/// Volume written for one entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub rows: u64,
    pub cells: u64,
    pub bytes: u64,
}

impl ExportStats {
    pub fn of_row(cells: &[Cell]) -> Self {
        Self {
            rows: 1,
            cells: cells.len() as u64,
            bytes: cells
                .iter()
                .map(|cell| (cell.row_key.len() + cell.value.len() + 1) as u64)
                .sum(),
        }
    }
}

impl Semigroup for ExportStats {
    fn combine(self, other: Self) -> Self {
        Self {
            rows: self.rows.saturating_add(other.rows),
            cells: self.cells.saturating_add(other.cells),
            bytes: self.bytes.saturating_add(other.bytes),
        }
    }
}

/// Wide-column store accepting rows of cells
#[async_trait]
pub trait CellStore: Send {
    async fn put(&mut self, cells: Vec<Cell>) -> ReleaseResult<()>;

    async fn flush(&mut self) -> ReleaseResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> ReleaseResult<()>;
}

/// Opens one store handle per partition
#[async_trait]
pub trait CellStoreProvider: Send + Sync {
    async fn open(&self, partition: usize) -> ReleaseResult<Box<dyn CellStore>>;
}

pub struct ExportDocumentWriter {
    partition: usize,
    store: Box<dyn CellStore>,
    ordinal: u64,
    stats: BTreeMap<u32, ExportStats>,
}

impl ExportDocumentWriter {
    pub fn new(partition: usize, store: Box<dyn CellStore>) -> Self {
        Self {
            partition,
            store,
            ordinal: 0,
            stats: BTreeMap::new(),
        }
    }

    /// Per-entity totals so far
    pub fn stats(&self) -> &BTreeMap<u32, ExportStats> {
        &self.stats
    }

    pub fn total(&self) -> ExportStats {
        self.stats
            .values()
            .copied()
            .fold(ExportStats::default(), Semigroup::combine)
    }
}

#[async_trait]
impl DocumentWriter for ExportDocumentWriter {
    async fn write(&mut self, document: Document) -> ReleaseResult<()> {
        let entity = entity_number(&document.id)?;
        let cells = to_cells(&document, self.ordinal, Utc::now().timestamp_millis())?;
        self.ordinal += 1;

        let row = ExportStats::of_row(&cells);
        let entry = self.stats.entry(entity).or_default();
        *entry = entry.combine(row);

        self.store.put(cells).await
    }

    async fn flush(&mut self) -> ReleaseResult<()> {
        self.store.flush().await
    }

    async fn close(&mut self) -> ReleaseResult<()> {
        let total = self.total();
        info!(
            partition = self.partition,
            entities = self.stats.len(),
            rows = total.rows,
            cells = total.cells,
            bytes = total.bytes,
            "Export partition finished"
        );
        self.store.close().await
    }
}

pub struct ExportWriterFactory {
    provider: Arc<dyn CellStoreProvider>,
}

impl ExportWriterFactory {
    pub fn new(provider: Arc<dyn CellStoreProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl WriterFactory for ExportWriterFactory {
    async fn create(&self, partition: usize) -> ReleaseResult<Box<dyn DocumentWriter>> {
        let store = self.provider.open(partition).await?;
        Ok(Box::new(ExportDocumentWriter::new(partition, store)))
    }
}
