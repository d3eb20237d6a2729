//! Collection orchestration
//!
//! # Overview
//!
//! 1. **Request**: describe the run with [`request::CollectionRequest`]
//! 2. **Planning**: [`window::WindowPlanner`] splits date ranges whose result
//!    count exceeds the provider cap
//! 3. **Collection**: [`orchestrator::CollectionOrchestrator`] runs the
//!    fetch → batch → enrich → persist loop for one window
//! 4. **Composition**: [`windowed::WindowedCollector`] runs the windows in
//!    order with contiguous batch numbering
//!
//! # Error Handling
//!
//! All operations return `Result<T, CollectError>`. Transient and rate-limit
//! failures are retried by the client before they get here; what arrives is
//! fatal. Batches already written stay on disk for later verification.
//!
//! # Related Modules
//!
//! - [`crate::client`] - Fetch and count collaborators
//! - [`crate::output`] - Batch persistence
//! - [`crate::verify`] - Auditing and repairing the output directory

use async_trait::async_trait;

pub mod batch;
pub mod config;
pub mod orchestrator;
pub mod request;
pub mod window;
pub mod windowed;

pub use batch::{AdaptiveBatchStrategy, BatchStrategy, FixedBatchStrategy, PendingQueue};
pub use orchestrator::CollectionOrchestrator;
pub use request::{CollectionRequest, CollectionRequestBuilder, CollectionResult};
pub use window::{TimeWindow, WindowPlanner};
pub use windowed::WindowedCollector;

use crate::client::ClientError;
use crate::output::OutputError;
use crate::resume::ResumeError;

/// Collection errors
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Fetch failed after retries, or was not retryable
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Batch could not be written
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Checkpoint could not be read or written
    #[error("resume error: {0}")]
    Resume(#[from] ResumeError),

    /// Request is unusable
    #[error("validation error: {0}")]
    Validation(String),

    /// Shutdown was requested
    #[error("collection cancelled")]
    Cancelled,
}

impl CollectError {
    /// Fold client cancellation into [`CollectError::Cancelled`]
    pub(crate) fn from_client(err: ClientError) -> Self {
        match err {
            ClientError::Cancelled => CollectError::Cancelled,
            other => CollectError::Client(other),
        }
    }
}

/// Result type for collection operations
pub type CollectResult<T> = Result<T, CollectError>;

/// Per-batch augmentation hook run before each batch is persisted
#[async_trait]
pub trait BatchEnricher<T: Send>: Send + Sync {
    /// Return the (possibly augmented) batch
    async fn enrich(&self, items: Vec<T>) -> CollectResult<Vec<T>>;
}

/// Enricher that returns batches unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

#[async_trait]
impl<T: Send + 'static> BatchEnricher<T> for NoopEnricher {
    async fn enrich(&self, items: Vec<T>) -> CollectResult<Vec<T>> {
        Ok(items)
    }
}
