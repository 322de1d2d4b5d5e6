//! JSON-lines collection files

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ReleaseError, ReleaseResult};
use crate::model::{Record, ReleaseCollection};

pub fn collection_path(dir: &Path, collection: impl AsRef<str>) -> PathBuf {
    dir.join(format!("{}.jsonl", collection.as_ref()))
}

/// Read `<dir>/<collection>.jsonl`. A missing file is an empty collection;
/// blank lines are ignored.
pub async fn read_collection(dir: &Path, collection: ReleaseCollection) -> ReleaseResult<Vec<Record>> {
    read_records(&collection_path(dir, collection.as_str())).await
}

pub async fn read_records(path: &Path) -> ReleaseResult<Vec<Record>> {
    if !path.exists() {
        debug!(path = %path.display(), "Collection file not found, treating as empty");
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).await?;
    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
            ReleaseError::data(format!("{}:{}: {e}", path.display(), index + 1))
        })?;
        let record = Record::from_value(value).ok_or_else(|| {
            ReleaseError::data(format!("{}:{}: not a JSON object", path.display(), index + 1))
        })?;
        records.push(record);
    }

    info!(path = %path.display(), records = records.len(), "Read collection");
    Ok(records)
}

pub async fn write_records(path: &Path, records: &[Record]) -> ReleaseResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut buffer = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buffer, record)?;
        buffer.push(b'\n');
    }

    let mut file = fs::File::create(path).await?;
    file.write_all(&buffer).await?;
    file.flush().await?;

    info!(path = %path.display(), records = records.len(), "Wrote collection");
    Ok(())
}
