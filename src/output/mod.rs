//! Batch file output
//!
//! A batch file is `batch_<NNN>_<collection_type>.json` (1-based, zero-padded
//! to three digits) holding `{"metadata": {...}, "<collection_type>": [...]}`.

use crate::CollectionType;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod archive;
pub mod json;

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Archive error
    #[error("archive error: {0}")]
    ArchiveError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Metadata block written at the top of every batch file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMetadata {
    /// 1-based batch number
    pub batch_index: usize,
    /// Items in the batch
    pub item_count: usize,
    /// Collection type key
    pub collection_type: String,
    /// `owner/repo`
    pub repository: String,
    /// State filter in effect
    pub state: String,
    /// ISO-8601 write time
    pub timestamp: String,
    /// Active label filters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_filters: Option<Vec<String>>,
    /// Label match mode, when labels are set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_mode: Option<String>,
}

/// Writes one batch to durable storage
pub trait BatchPersister<T>: Send + Sync {
    /// Persist `items` as batch `metadata.batch_index` in `dir`; returns the filename
    fn persist(&self, dir: &Path, metadata: &BatchMetadata, items: &[T]) -> OutputResult<String>;
}

/// Filename for batch `index` of `collection_type`
pub fn batch_filename(index: usize, collection_type: CollectionType) -> String {
    format!("batch_{index:03}_{}.json", collection_type.as_str())
}

/// Batch number encoded in `filename`, if it is a batch file of `collection_type`
pub fn parse_batch_number(filename: &str, collection_type: CollectionType) -> Option<usize> {
    let suffix = format!("_{}.json", collection_type.as_str());
    let digits = filename.strip_prefix("batch_")?.strip_suffix(suffix.as_str())?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Batch files of `collection_type` in `dir`, sorted by number then name
pub fn list_batch_files(
    dir: &Path,
    collection_type: CollectionType,
) -> OutputResult<Vec<(usize, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| OutputError::IoError(format!("failed to read {}: {e}", dir.display())))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| OutputError::IoError(e.to_string()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(number) = parse_batch_number(name, collection_type) {
            files.push((number, entry.path()));
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(files)
}

/// Delete every batch file of `collection_type` in `dir`; other files are kept
pub fn remove_batch_files(dir: &Path, collection_type: CollectionType) -> OutputResult<usize> {
    let files = list_batch_files(dir, collection_type)?;
    for (_, path) in &files {
        std::fs::remove_file(path)
            .map_err(|e| OutputError::IoError(format!("failed to remove {}: {e}", path.display())))?;
        debug!(path = %path.display(), "Removed batch file");
    }
    if !files.is_empty() {
        info!(
            removed = files.len(),
            collection_type = %collection_type,
            dir = %dir.display(),
            "Cleaned existing batch files"
        );
    }
    Ok(files.len())
}

/// Replace `path` with `bytes` via a synced temp file in the same directory
pub fn write_atomic(path: &Path, bytes: &[u8]) -> OutputResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| OutputError::IoError(e.to_string()))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| OutputError::IoError(format!("failed to create temp file: {e}")))?;
    temp.write_all(bytes)
        .map_err(|e| OutputError::IoError(format!("failed to write temp file: {e}")))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| OutputError::IoError(format!("failed to sync temp file: {e}")))?;
    temp.persist(path)
        .map_err(|e| OutputError::IoError(format!("failed to persist {}: {e}", path.display())))?;
    Ok(())
}
