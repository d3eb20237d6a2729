//! Page-aligned collection checkpoints

use serde::{Deserialize, Serialize};

/// Progress after a persisted batch that left no items pending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    cursor: String,
    batch_number: usize,
    processed: u64,
    completed_at: i64,
}

impl Checkpoint {
    /// Checkpoint resuming at `cursor`, after batch `batch_number`
    pub fn new(cursor: impl Into<String>, batch_number: usize, processed: u64) -> Self {
        Self {
            cursor: cursor.into(),
            batch_number,
            processed,
            completed_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Cursor of the next page to fetch
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    /// Last batch number written
    pub fn batch_number(&self) -> usize {
        self.batch_number
    }

    /// Items processed so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Unix milliseconds when the checkpoint was taken
    pub fn completed_at(&self) -> i64 {
        self.completed_at
    }
}
