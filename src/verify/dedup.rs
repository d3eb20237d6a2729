//! Keep-first duplicate removal with contiguous renumbering

use super::{item_key, read_batch, DuplicateItem, VerifyError};
use crate::output::{self, json::to_bytes, write_atomic};
use crate::CollectionType;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const RENUMBER_SUFFIX: &str = ".renumber";

/// Counts from one deduplication pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeduplicationResult {
    /// Item occurrences dropped
    pub duplicates_removed: usize,
    /// Files rewritten with fewer items
    pub files_rewritten: usize,
    /// Files deleted because they ended up empty
    pub files_deleted: usize,
    /// Files whose batch number changed
    pub files_renumbered: usize,
}

/// Repairs duplicates reported by [`super::VerificationEngine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DeduplicationEngine;

impl DeduplicationEngine {
    /// Create an engine
    pub fn new() -> Self {
        Self
    }

    /// Remove every occurrence of each duplicate except the one in its first
    /// file, delete files left empty, then renumber the rest to `1..=N`.
    pub fn deduplicate(
        &self,
        dir: &Path,
        collection_type: CollectionType,
        duplicates: &[DuplicateItem],
    ) -> Result<DeduplicationResult, VerifyError> {
        let mut result = DeduplicationResult::default();

        let mut removals: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        for duplicate in duplicates {
            for file in duplicate.files.iter().skip(1) {
                removals
                    .entry(file.as_str())
                    .or_default()
                    .insert(duplicate.id.as_str());
            }
        }

        if removals.is_empty() {
            debug!("No duplicates to remove");
            return Ok(result);
        }

        let key = collection_type.as_str();
        let id_field = collection_type.id_field();
        let mut emptied = Vec::new();

        for (file, ids) in &removals {
            let path = dir.join(file);
            let mut doc = read_batch(&path)
                .map_err(|e| VerifyError::Io(format!("failed to read {file}: {e}")))?;

            let Some(items) = doc.get_mut(key).and_then(Value::as_array_mut) else {
                warn!(file = %file, "Batch has no item array; skipping");
                continue;
            };

            let before = items.len();
            items.retain(|item| {
                item_key(item, id_field).map_or(true, |id| !ids.contains(id.as_str()))
            });
            let removed = before - items.len();
            if removed == 0 {
                continue;
            }
            result.duplicates_removed += removed;

            if items.is_empty() {
                debug!(file = %file, removed, "Batch emptied");
                emptied.push(path);
                continue;
            }

            let remaining = items.len();
            if let Some(metadata) = doc.get_mut("metadata").and_then(Value::as_object_mut) {
                metadata.insert("item_count".to_string(), Value::from(remaining));
            }
            write_atomic(&path, &to_bytes(&doc, true)?)?;
            result.files_rewritten += 1;
            debug!(file = %file, removed, remaining, "Batch rewritten");
        }

        for path in &emptied {
            std::fs::remove_file(path)
                .map_err(|e| VerifyError::Io(format!("failed to delete {}: {e}", path.display())))?;
            result.files_deleted += 1;
        }

        if result.files_deleted > 0 {
            result.files_renumbered = renumber(dir, collection_type)?;
        }

        info!(
            duplicates_removed = result.duplicates_removed,
            files_rewritten = result.files_rewritten,
            files_deleted = result.files_deleted,
            files_renumbered = result.files_renumbered,
            "Deduplication complete"
        );
        Ok(result)
    }
}

/// Rename batches to a contiguous `1..=N` sequence in two phases so no target
/// name is occupied mid-rename; returns how many changed number
fn renumber(dir: &Path, collection_type: CollectionType) -> Result<usize, VerifyError> {
    let files = output::list_batch_files(dir, collection_type)?;

    let mut staged: Vec<(usize, PathBuf)> = Vec::with_capacity(files.len());
    for (number, path) in files {
        let mut temp = path.clone().into_os_string();
        temp.push(RENUMBER_SUFFIX);
        let temp = PathBuf::from(temp);
        std::fs::rename(&path, &temp)
            .map_err(|e| VerifyError::Io(format!("failed to stage {}: {e}", path.display())))?;
        staged.push((number, temp));
    }

    let mut renumbered = 0;
    for (position, (number, temp)) in staged.into_iter().enumerate() {
        let index = position + 1;
        let target = dir.join(output::batch_filename(index, collection_type));

        if index != number {
            if let Ok(mut doc) = read_batch(&temp) {
                if let Some(metadata) = doc.get_mut("metadata").and_then(Value::as_object_mut) {
                    metadata.insert("batch_index".to_string(), Value::from(index));
                    write_atomic(&temp, &to_bytes(&doc, true)?)?;
                }
            }
            renumbered += 1;
            debug!(from = number, to = index, "Renumbering batch");
        }

        std::fs::rename(&temp, &target)
            .map_err(|e| VerifyError::Io(format!("failed to rename to {}: {e}", target.display())))?;
    }

    Ok(renumbered)
}
