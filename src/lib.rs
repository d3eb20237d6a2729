//! # Repository Data Collector Library
//!
//! Collects large result sets (issues, pull requests, collaborators, releases)
//! from a paginated, rate-limited code-hosting API into numbered batch files,
//! then audits and repairs the resulting dataset.
//!
//! ## Features
//!
//! - **Windowed Collection**: Date ranges that exceed the provider's per-query
//!   result cap are split recursively until every window fits
//! - **Rate Limit Awareness**: Retries with exponential backoff, waits for the
//!   advertised quota reset, and paces requests when quota runs low
//! - **Batching**: Fixed or adaptive batch sizing with contiguous file numbering
//!   across windows
//! - **Verification**: Duplicate, date-range, state and numbering checks over an
//!   existing output directory
//! - **Repair**: Keep-first deduplication with collision-free renumbering
//! - **Resume**: Optional page-aligned checkpoints for interrupted runs
//!
//! ## Quick Start
//!
//! ```no_run
//! use repo_data_collector::client::{http::HttpTransport, retry::RateLimitAwareClient, search::GitHubSource};
//! use repo_data_collector::collector::{CollectionOrchestrator, CollectionRequest, WindowedCollector};
//! use repo_data_collector::output::json::JsonBatchWriter;
//! use repo_data_collector::CollectionType;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new("https://api.github.com", None)?;
//! let client = Arc::new(RateLimitAwareClient::new(transport));
//! let source = GitHubSource::new(client, CollectionType::Issues);
//!
//! let request = CollectionRequest::builder("rust-lang/rust".parse()?, CollectionType::Issues)
//!     .state("open")
//!     .created_after("2023-01-01")
//!     .created_before("2024-01-01")
//!     .output_dir("./out")
//!     .build()
//!     .validated();
//!
//! let orchestrator = CollectionOrchestrator::new(source.clone(), JsonBatchWriter::new());
//! let collector = WindowedCollector::new(orchestrator, source);
//! let result = collector.collect(&request).await?;
//! println!("{} items in {} files", result.processed, result.batch_files.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`repository`] - `owner/repo` identifier parsing
//! - [`client`] - Transport trait, rate-limit-aware retrying client, provider adapter
//! - [`collector`] - Window planner, batch strategies, orchestrator, windowed collector
//! - [`output`] - Batch file persistence and zip archives
//! - [`verify`] - Verification and deduplication engines
//! - [`resume`] - Optional checkpointing
//!
//! ## Concurrency
//!
//! A collection run is a single sequential task. The output directory is
//! assumed to have one writer at a time; running the verification or
//! deduplication engines concurrently with a collection (or with each other)
//! against the same directory is undefined behavior.

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// CLI command implementations
pub mod cli;

/// Provider transport, retry client and search adapter
pub mod client;

/// Collection orchestration
pub mod collector;

/// Observability metrics
pub mod metrics;

/// Batch file writers
pub mod output;

/// Repository identifier parsing and validation
pub mod repository;

/// Resume capability for collection runs
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Batch directory verification and repair
pub mod verify;

// Re-export commonly used types
pub use repository::RepositoryId;

/// Kind of item being collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    /// Issues (search endpoint)
    Issues,
    /// Pull requests (search endpoint)
    PullRequests,
    /// Repository collaborators (list endpoint)
    Collaborators,
    /// Releases (list endpoint)
    Releases,
}

impl CollectionType {
    /// Key of the item array inside a batch file, also used as filename suffix
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::Issues => "issues",
            CollectionType::PullRequests => "pull_requests",
            CollectionType::Collaborators => "collaborators",
            CollectionType::Releases => "releases",
        }
    }

    /// Field that uniquely identifies an item of this type
    pub fn id_field(&self) -> &'static str {
        match self {
            CollectionType::Releases | CollectionType::Collaborators => "id",
            CollectionType::Issues | CollectionType::PullRequests => "number",
        }
    }

    /// Whether items carry a creation timestamp that date filters apply to
    pub fn supports_date_filter(&self) -> bool {
        !matches!(self, CollectionType::Collaborators)
    }

    /// Whether items carry an open/closed state
    pub fn supports_state_filter(&self) -> bool {
        matches!(self, CollectionType::Issues | CollectionType::PullRequests)
    }

    /// Whether the provider serves this type from its search endpoint
    pub fn is_searchable(&self) -> bool {
        matches!(self, CollectionType::Issues | CollectionType::PullRequests)
    }
}

impl std::fmt::Display for CollectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CollectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "issues" | "issue" => Ok(CollectionType::Issues),
            "pull_requests" | "pulls" | "prs" | "pr" => Ok(CollectionType::PullRequests),
            "collaborators" => Ok(CollectionType::Collaborators),
            "releases" => Ok(CollectionType::Releases),
            _ => Err(format!(
                "Invalid collection type: {s}. Valid options: issues, pull_requests, collaborators, releases"
            )),
        }
    }
}

/// Result-state filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Open items only
    Open,
    /// Closed items only
    Closed,
    /// Merged pull requests only
    Merged,
    /// No state filter
    #[default]
    All,
}

impl ItemState {
    /// Lowercase name as it appears in batch metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Open => "open",
            ItemState::Closed => "closed",
            ItemState::Merged => "merged",
            ItemState::All => "all",
        }
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(ItemState::Open),
            "closed" => Ok(ItemState::Closed),
            "merged" => Ok(ItemState::Merged),
            "all" => Ok(ItemState::All),
            _ => Err(format!(
                "Invalid state: {s}. Valid options: open, closed, merged, all"
            )),
        }
    }
}

/// How multiple label filters combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    /// Match items carrying any of the labels
    #[default]
    Any,
    /// Match items carrying every label
    All,
}

impl LabelMode {
    /// Lowercase name as it appears in batch metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelMode::Any => "any",
            LabelMode::All => "all",
        }
    }
}

impl FromStr for LabelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" => Ok(LabelMode::Any),
            "all" => Ok(LabelMode::All),
            _ => Err(format!("Invalid label mode: {s}. Valid options: any, all")),
        }
    }
}

/// Provider-side sort field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    /// Creation time
    #[default]
    Created,
    /// Last update time
    Updated,
    /// Comment count
    Comments,
}

impl SortField {
    /// Name used in provider queries
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Created => "created",
            SortField::Updated => "updated",
            SortField::Comments => "comments",
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" => Ok(SortField::Created),
            "updated" => Ok(SortField::Updated),
            "comments" => Ok(SortField::Comments),
            _ => Err(format!(
                "Invalid sort field: {s}. Valid options: created, updated, comments"
            )),
        }
    }
}

/// Provider-side sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Newest / largest first
    #[default]
    Desc,
    /// Oldest / smallest first
    Asc,
}

impl SortDirection {
    /// Name used in provider queries
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Desc => "desc",
            SortDirection::Asc => "asc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "desc" => Ok(SortDirection::Desc),
            "asc" => Ok(SortDirection::Asc),
            _ => Err(format!("Invalid sort direction: {s}. Valid options: asc, desc")),
        }
    }
}

/// Parse an enum value, substituting the default for unrecognized input.
///
/// Used by request normalization, which never fails on a bad enum value.
pub fn parse_or_default<T>(value: &str, what: &str) -> T
where
    T: FromStr<Err = String> + Default + std::fmt::Debug,
{
    match value.parse::<T>() {
        Ok(parsed) => parsed,
        Err(e) => {
            let fallback = T::default();
            warn!(value = %value, field = what, fallback = ?fallback, "{e}; using default");
            fallback
        }
    }
}
