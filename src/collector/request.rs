//! Collection request and result types

use super::config::{page_size_for, DEFAULT_BATCH_SIZE};
use super::window::TimeWindow;
use crate::repository::RepositoryId;
use crate::{parse_or_default, CollectionType, ItemState, LabelMode, SortDirection, SortField};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

/// Description of one collection run.
///
/// Build with [`CollectionRequest::builder`] and normalize with
/// [`CollectionRequest::validated`]; per-window copies come from
/// [`CollectionRequest::for_window`]. Never mutated after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRequest {
    /// Repository to collect from
    pub repository: RepositoryId,
    /// Kind of item
    pub collection_type: CollectionType,
    /// Result-state filter
    pub state: ItemState,
    /// Label filters
    pub labels: Vec<String>,
    /// How labels combine
    pub label_mode: LabelMode,
    /// Items per batch file
    pub batch_size: usize,
    /// Optional hard cap on processed items
    pub max_items: Option<u64>,
    /// Sort field
    pub sort: SortField,
    /// Sort direction
    pub direction: SortDirection,
    /// Inclusive lower creation-date bound
    pub created_after: Option<NaiveDate>,
    /// Exclusive upper creation-date bound
    pub created_before: Option<NaiveDate>,
    /// Fetch and batch without writing files
    pub dry_run: bool,
    /// Delete this type's batch files before the first batch
    pub clean: bool,
    /// Bundle the written batches into a zip archive
    pub zip: bool,
    /// Verbose logging requested
    pub verbose: bool,
    /// Number of batch files already written by earlier windows
    pub batch_offset: usize,
    /// Directory receiving batch files
    pub output_dir: PathBuf,
}

impl CollectionRequest {
    /// Start building a request
    pub fn builder(
        repository: RepositoryId,
        collection_type: CollectionType,
    ) -> CollectionRequestBuilder {
        CollectionRequestBuilder::new(repository, collection_type)
    }

    /// Normalize the request.
    ///
    /// Never fails: unusable values are replaced by defaults and logged.
    pub fn validated(mut self) -> Self {
        if self.batch_size == 0 {
            warn!(default = DEFAULT_BATCH_SIZE, "Batch size 0 is invalid; using default");
            self.batch_size = DEFAULT_BATCH_SIZE;
        }

        if self.max_items == Some(0) {
            warn!("max_items of 0 ignored");
            self.max_items = None;
        }

        if !self.collection_type.supports_state_filter() && self.state != ItemState::All {
            warn!(
                collection_type = %self.collection_type,
                state = %self.state,
                "State filter does not apply; ignoring"
            );
            self.state = ItemState::All;
        }

        if self.collection_type == CollectionType::Issues && self.state == ItemState::Merged {
            warn!("Issues cannot be merged; using 'closed'");
            self.state = ItemState::Closed;
        }

        if !self.collection_type.supports_date_filter()
            && (self.created_after.is_some() || self.created_before.is_some())
        {
            warn!(
                collection_type = %self.collection_type,
                "Date filters do not apply; ignoring"
            );
            self.created_after = None;
            self.created_before = None;
        }

        self.labels = self
            .labels
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        if self.label_mode == LabelMode::Any && self.labels.len() > 1 {
            warn!(
                labels = ?self.labels,
                used = %self.labels[0],
                "Search cannot OR labels; only the first label is applied"
            );
        }

        self
    }

    /// Copy of this request restricted to `window`
    pub fn for_window(&self, window: &TimeWindow, clean: bool, batch_offset: usize) -> Self {
        Self {
            created_after: Some(window.after),
            created_before: Some(window.before),
            clean,
            batch_offset,
            ..self.clone()
        }
    }

    /// Both date bounds, when set
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.created_after.zip(self.created_before)
    }

    /// Provider page size for this request
    pub fn page_size(&self) -> usize {
        page_size_for(self.batch_size)
    }

    /// Labels that actually reach the provider query
    pub fn effective_labels(&self) -> &[String] {
        match self.label_mode {
            LabelMode::All => &self.labels,
            LabelMode::Any => &self.labels[..self.labels.len().min(1)],
        }
    }

    /// Render the provider query string
    pub fn search_query(&self) -> String {
        let mut parts = vec![format!("repo:{}", self.repository)];

        match self.collection_type {
            CollectionType::Issues => parts.push("is:issue".to_string()),
            CollectionType::PullRequests => parts.push("is:pr".to_string()),
            _ => {}
        }

        if self.collection_type.supports_state_filter() {
            match self.state {
                ItemState::Open => parts.push("is:open".to_string()),
                ItemState::Closed => parts.push("is:closed".to_string()),
                ItemState::Merged => parts.push("is:merged".to_string()),
                ItemState::All => {}
            }
        }

        if self.collection_type.is_searchable() {
            for label in self.effective_labels() {
                parts.push(format!("label:\"{label}\""));
            }
        }

        if self.collection_type.supports_date_filter() {
            if let Some(created) = created_qualifier(self.created_after, self.created_before) {
                parts.push(created);
            }
        }

        if self.collection_type.is_searchable() {
            parts.push(format!(
                "sort:{}-{}",
                self.sort.as_str(),
                self.direction.as_str()
            ));
        }

        parts.join(" ")
    }
}

/// `created:` qualifier for `[after, before)`; the provider's range syntax
/// is inclusive at both ends.
fn created_qualifier(after: Option<NaiveDate>, before: Option<NaiveDate>) -> Option<String> {
    match (after, before) {
        (Some(after), Some(before)) => {
            let last = before.pred_opt().unwrap_or(before);
            Some(format!("created:{after}..{last}"))
        }
        (Some(after), None) => Some(format!("created:>={after}")),
        (None, Some(before)) => Some(format!("created:<{before}")),
        (None, None) => None,
    }
}

fn parse_date(value: &str, what: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(e) => {
            warn!(value, field = what, error = %e, "Ignoring invalid date");
            None
        }
    }
}

/// Builder for [`CollectionRequest`]
#[derive(Debug, Clone)]
pub struct CollectionRequestBuilder {
    request: CollectionRequest,
}

impl CollectionRequestBuilder {
    fn new(repository: RepositoryId, collection_type: CollectionType) -> Self {
        Self {
            request: CollectionRequest {
                repository,
                collection_type,
                state: ItemState::default(),
                labels: Vec::new(),
                label_mode: LabelMode::default(),
                batch_size: DEFAULT_BATCH_SIZE,
                max_items: None,
                sort: SortField::default(),
                direction: SortDirection::default(),
                created_after: None,
                created_before: None,
                dry_run: false,
                clean: false,
                zip: false,
                verbose: false,
                batch_offset: 0,
                output_dir: PathBuf::from("."),
            },
        }
    }

    /// State filter; unknown values fall back to `all`
    pub fn state(mut self, state: &str) -> Self {
        self.request.state = parse_or_default(state, "state");
        self
    }

    /// Add one label filter
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.request.labels.push(label.into());
        self
    }

    /// Replace the label filters
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Label mode; unknown values fall back to `any`
    pub fn label_mode(mut self, mode: &str) -> Self {
        self.request.label_mode = parse_or_default(mode, "label_mode");
        self
    }

    /// Items per batch file
    pub fn batch_size(mut self, size: usize) -> Self {
        self.request.batch_size = size;
        self
    }

    /// Hard cap on processed items
    pub fn max_items(mut self, max: Option<u64>) -> Self {
        self.request.max_items = max;
        self
    }

    /// Sort field; unknown values fall back to `created`
    pub fn sort(mut self, sort: &str) -> Self {
        self.request.sort = parse_or_default(sort, "sort");
        self
    }

    /// Sort direction; unknown values fall back to `desc`
    pub fn direction(mut self, direction: &str) -> Self {
        self.request.direction = parse_or_default(direction, "direction");
        self
    }

    /// Inclusive lower bound as `YYYY-MM-DD`; invalid dates are ignored
    pub fn created_after(mut self, date: &str) -> Self {
        self.request.created_after = parse_date(date, "created_after");
        self
    }

    /// Exclusive upper bound as `YYYY-MM-DD`; invalid dates are ignored
    pub fn created_before(mut self, date: &str) -> Self {
        self.request.created_before = parse_date(date, "created_before");
        self
    }

    /// Both bounds as dates
    pub fn date_range(mut self, after: Option<NaiveDate>, before: Option<NaiveDate>) -> Self {
        self.request.created_after = after;
        self.request.created_before = before;
        self
    }

    /// Skip writing files
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.request.dry_run = dry_run;
        self
    }

    /// Delete existing batch files of this type first
    pub fn clean(mut self, clean: bool) -> Self {
        self.request.clean = clean;
        self
    }

    /// Bundle output into a zip archive
    pub fn zip(mut self, zip: bool) -> Self {
        self.request.zip = zip;
        self
    }

    /// Verbose logging
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.request.verbose = verbose;
        self
    }

    /// Start batch numbering after `offset` existing files
    pub fn batch_offset(mut self, offset: usize) -> Self {
        self.request.batch_offset = offset;
        self
    }

    /// Output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.request.output_dir = dir.into();
        self
    }

    /// Finish building
    pub fn build(self) -> CollectionRequest {
        self.request
    }
}

/// Outcome of a collection run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionResult {
    /// Items the provider reported as matching (summed over windows)
    pub total_available: u64,
    /// Items written (or, in a dry run, that would have been written)
    pub processed: u64,
    /// Batch filenames in write order
    pub batch_files: Vec<String>,
    /// Batches produced, including dry-run batches that were only logged
    pub batches: usize,
    /// Directory the batches were written to
    pub output_dir: PathBuf,
    /// Windows processed
    pub windows: usize,
    /// Whether a checkpoint was resumed
    pub resumed: bool,
}

impl CollectionResult {
    /// Fold one window's result into the running total
    pub fn absorb(&mut self, window: CollectionResult) {
        if self.windows == 0 {
            self.output_dir = window.output_dir;
        }
        self.total_available += window.total_available;
        self.processed += window.processed;
        self.batch_files.extend(window.batch_files);
        self.batches += window.batches;
        self.windows += window.windows.max(1);
        self.resumed |= window.resumed;
    }
}
