//! JSON batch writer

use super::{batch_filename, write_atomic, BatchMetadata, BatchPersister, OutputError, OutputResult};
use crate::CollectionType;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Writes `{"metadata": ..., "<collection_type>": [...]}` atomically
#[derive(Debug, Clone, Copy)]
pub struct JsonBatchWriter {
    pretty: bool,
}

impl Default for JsonBatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonBatchWriter {
    /// Pretty-printing writer
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// Toggle pretty printing
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// Render a batch document
pub fn render_batch<T: Serialize>(metadata: &BatchMetadata, items: &[T]) -> OutputResult<Value> {
    let mut doc = Map::new();
    doc.insert(
        "metadata".to_string(),
        serde_json::to_value(metadata).map_err(|e| OutputError::SerializationError(e.to_string()))?,
    );
    doc.insert(
        metadata.collection_type.clone(),
        serde_json::to_value(items).map_err(|e| OutputError::SerializationError(e.to_string()))?,
    );
    Ok(Value::Object(doc))
}

/// Serialize a document the way batch files are written
pub fn to_bytes(doc: &Value, pretty: bool) -> OutputResult<Vec<u8>> {
    let result = if pretty {
        serde_json::to_vec_pretty(doc)
    } else {
        serde_json::to_vec(doc)
    };
    result.map_err(|e| OutputError::SerializationError(e.to_string()))
}

impl<T: Serialize + Sync> BatchPersister<T> for JsonBatchWriter {
    fn persist(&self, dir: &Path, metadata: &BatchMetadata, items: &[T]) -> OutputResult<String> {
        let collection_type = CollectionType::from_str(&metadata.collection_type)
            .map_err(OutputError::SerializationError)?;
        let filename = batch_filename(metadata.batch_index, collection_type);
        let path = dir.join(&filename);

        let doc = render_batch(metadata, items)?;
        write_atomic(&path, &to_bytes(&doc, self.pretty)?)?;

        debug!(
            path = %path.display(),
            items = items.len(),
            "Batch written"
        );
        Ok(filename)
    }
}
