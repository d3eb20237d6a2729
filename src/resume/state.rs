//! Resume state persistence
//!
//! One state file per (repository, collection type, window), written
//! atomically under an advisory lock and tagged with a schema version.

use super::checkpoint::Checkpoint;
use crate::collector::TimeWindow;
use crate::repository::RepositoryId;
use crate::CollectionType;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current resume state schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// Checkpoints retained per state file
const MAX_CHECKPOINTS: usize = 5;

/// Maximum allowed state file size (10 MB)
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Resume state for one unit of collection work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeState {
    schema_version: String,
    repository: String,
    collection_type: CollectionType,
    query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    window: Option<TimeWindow>,
    checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    batch_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_available: Option<u64>,
    #[serde(default)]
    completed: bool,
    created_at: i64,
    updated_at: i64,
}

impl ResumeState {
    /// Fresh state for `query`
    pub fn new(
        repository: &RepositoryId,
        collection_type: CollectionType,
        query: impl Into<String>,
        window: Option<TimeWindow>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            repository: repository.to_string(),
            collection_type,
            query: query.into(),
            window,
            checkpoints: Vec::new(),
            batch_files: Vec::new(),
            total_available: None,
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// State file location inside `dir`
    pub fn path_for(
        dir: &Path,
        repository: &RepositoryId,
        collection_type: CollectionType,
        window: Option<&TimeWindow>,
    ) -> PathBuf {
        let mut name = format!("{}_{}", repository.to_filesystem_safe(), collection_type.as_str());
        if let Some(window) = window {
            name.push_str(&format!("_{}_{}", window.after, window.before));
        }
        dir.join(format!("{name}.resume.json"))
    }

    /// Repository this state belongs to
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Collection type this state belongs to
    pub fn collection_type(&self) -> CollectionType {
        self.collection_type
    }

    /// Query the checkpoints were taken against
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Window the checkpoints were taken in
    pub fn window(&self) -> Option<&TimeWindow> {
        self.window.as_ref()
    }

    /// Retained checkpoints, oldest first
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Most recent checkpoint
    pub fn latest(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    /// Whether this state was recorded for the same query
    pub fn matches(&self, query: &str) -> bool {
        self.query == query
    }

    /// Batch files written so far, in write order
    pub fn batch_files(&self) -> &[String] {
        &self.batch_files
    }

    /// Record a written batch file
    pub fn record_batch(&mut self, filename: impl Into<String>) {
        self.batch_files.push(filename.into());
    }

    /// Provider-reported total, once known
    pub fn total_available(&self) -> Option<u64> {
        self.total_available
    }

    /// Remember the provider-reported total
    pub fn set_total_available(&mut self, total: u64) {
        self.total_available = Some(total);
    }

    /// Whether the unit of work finished
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Mark the unit of work finished with `processed` items
    pub fn mark_completed(&mut self, processed: u64) {
        self.completed = true;
        let last_batch = self
            .latest()
            .map(|c| c.batch_number())
            .unwrap_or(0)
            .max(self.latest_batch_number_from_files());
        self.add_checkpoint(Checkpoint::new(String::new(), last_batch, processed));
    }

    fn latest_batch_number_from_files(&self) -> usize {
        self.batch_files
            .iter()
            .filter_map(|name| crate::output::parse_batch_number(name, self.collection_type))
            .max()
            .unwrap_or(0)
    }

    /// Append a checkpoint, keeping only the most recent few
    pub fn add_checkpoint(&mut self, checkpoint: Checkpoint) {
        debug!(
            cursor = checkpoint.cursor(),
            batch_number = checkpoint.batch_number(),
            processed = checkpoint.processed(),
            "Adding checkpoint"
        );
        self.checkpoints.push(checkpoint);

        if self.checkpoints.len() > MAX_CHECKPOINTS {
            let drain_count = self.checkpoints.len() - MAX_CHECKPOINTS;
            self.checkpoints.drain(0..drain_count);
        }

        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    fn open_lock(path: &Path) -> Result<RwLock<std::fs::File>, ResumeError> {
        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;
        Ok(RwLock::new(lock_file))
    }

    /// Save atomically under an exclusive lock
    pub fn save(&self, path: &Path) -> Result<(), ResumeError> {
        let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let mut lock = Self::open_lock(path)?;
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        debug!(
            path = %path.display(),
            checkpoints = self.checkpoints.len(),
            "Resume state saved"
        );
        Ok(())
    }

    /// Load under a shared lock, rejecting other schema versions
    pub fn load(path: &Path) -> Result<Self, ResumeError> {
        let lock = Self::open_lock(path)?;
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        let state: ResumeState = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize resume state");
            ResumeError::DeserializationError(e.to_string())
        })?;

        if state.schema_version != SCHEMA_VERSION {
            warn!(
                found_version = %state.schema_version,
                expected_version = SCHEMA_VERSION,
                "Resume state schema version mismatch"
            );
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: state.schema_version,
            });
        }

        info!(
            path = %path.display(),
            checkpoints = state.checkpoints.len(),
            "Resume state loaded"
        );
        Ok(state)
    }

    /// Load if present; unreadable or mismatched state is discarded with a warning
    pub fn load_if_exists(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match Self::load(path) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unusable resume state");
                None
            }
        }
    }

    /// Delete the state file and its lock file
    pub fn remove(path: &Path) -> Result<(), ResumeError> {
        for target in [path.to_path_buf(), path.with_extension("lock")] {
            match std::fs::remove_file(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ResumeError::IoError(e.to_string())),
            }
        }
        debug!(path = %path.display(), "Resume state removed");
        Ok(())
    }
}

/// Errors related to resume state
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
