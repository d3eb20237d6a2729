//! Fetch → batch → enrich → persist loop for one unit of work
//!
//! A unit is one query, optionally restricted to a single date window. The
//! loop keeps a queue of fetched-but-unbatched items; pages are appended at
//! the back and batches carved off the front, so batch contents follow
//! provider order.

use super::batch::{BatchStrategy, FixedBatchStrategy, PendingQueue};
use super::request::{CollectionRequest, CollectionResult};
use super::window::TimeWindow;
use super::{BatchEnricher, CollectError, CollectResult, NoopEnricher};
use crate::client::PageFetcher;
use crate::metrics::{self, CollectionMetrics};
use crate::output::{self, BatchMetadata, BatchPersister, OutputError};
use crate::resume::{Checkpoint, ResumeState};
use crate::shutdown::SharedShutdown;
use indicatif::ProgressBar;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Instrument};

/// Drives one collection unit using injected fetch, persist and enrich
/// collaborators and a batch strategy
pub struct CollectionOrchestrator<F: PageFetcher, P, E = NoopEnricher> {
    fetcher: F,
    persister: P,
    enricher: E,
    strategy: Box<dyn BatchStrategy<F::Item>>,
    resume_dir: Option<PathBuf>,
    shutdown: Option<SharedShutdown>,
    progress: Option<ProgressBar>,
}

impl<F: PageFetcher, P> CollectionOrchestrator<F, P, NoopEnricher> {
    /// Orchestrator with fixed batching, no enrichment and no checkpoints
    pub fn new(fetcher: F, persister: P) -> Self {
        Self {
            fetcher,
            persister,
            enricher: NoopEnricher,
            strategy: Box::new(FixedBatchStrategy),
            resume_dir: None,
            shutdown: None,
            progress: None,
        }
    }
}

impl<F: PageFetcher, P, E> CollectionOrchestrator<F, P, E> {
    /// Replace the enricher
    pub fn with_enricher<E2>(self, enricher: E2) -> CollectionOrchestrator<F, P, E2> {
        CollectionOrchestrator {
            fetcher: self.fetcher,
            persister: self.persister,
            enricher,
            strategy: self.strategy,
            resume_dir: self.resume_dir,
            shutdown: self.shutdown,
            progress: self.progress,
        }
    }

    /// Replace the batch strategy
    pub fn with_strategy<S>(mut self, strategy: S) -> Self
    where
        S: BatchStrategy<F::Item> + 'static,
    {
        self.strategy = Box::new(strategy);
        self
    }

    /// Enable checkpoints stored under `dir`
    pub fn with_resume(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resume_dir = Some(dir.into());
        self
    }

    /// Attach a cancellation token checked at every loop iteration
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Report processed items on a progress bar
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Checkpoint directory, when enabled
    pub fn resume_dir(&self) -> Option<&Path> {
        self.resume_dir.as_deref()
    }

    /// Name of the active batch strategy
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    fn check_cancelled(&self) -> CollectResult<()> {
        match &self.shutdown {
            Some(shutdown) if shutdown.is_shutdown_requested() => {
                warn!("Shutdown requested; stopping collection");
                Err(CollectError::Cancelled)
            }
            _ => Ok(()),
        }
    }

    fn state_path(&self, request: &CollectionRequest) -> Option<PathBuf> {
        if request.dry_run {
            return None;
        }
        let window = request.date_range().map(|(a, b)| TimeWindow::new(a, b));
        self.resume_dir.as_ref().map(|dir| {
            ResumeState::path_for(dir, &request.repository, request.collection_type, window.as_ref())
        })
    }

    /// Remove the checkpoint kept for `request`, if any
    pub fn discard_resume_state(&self, request: &CollectionRequest) -> CollectResult<()> {
        if let Some(path) = self.state_path(request) {
            ResumeState::remove(&path)?;
        }
        Ok(())
    }
}

impl<F, P, E> CollectionOrchestrator<F, P, E>
where
    F: PageFetcher,
    F::Item: Serialize + Sync + 'static,
    P: BatchPersister<F::Item>,
    E: BatchEnricher<F::Item>,
{
    /// Run one unit of work to completion.
    ///
    /// Fatal fetch or persist errors propagate; batches already written stay
    /// on disk.
    pub async fn collect(&self, request: &CollectionRequest) -> CollectResult<CollectionResult> {
        self.collect_unit(request, false).await
    }

    /// Like [`collect`](Self::collect); with `retain_state` a finished unit
    /// keeps its checkpoint marked complete instead of deleting it, so a
    /// resumed multi-window run can skip it.
    pub(crate) async fn collect_unit(
        &self,
        request: &CollectionRequest,
        retain_state: bool,
    ) -> CollectResult<CollectionResult> {
        let span = tracing::info_span!(
            "collect",
            repository = %request.repository,
            collection_type = %request.collection_type,
            after = ?request.created_after,
            before = ?request.created_before,
        );
        let run_metrics = CollectionMetrics::start(
            request.collection_type.as_str(),
            request.repository.to_string(),
        );

        let outcome = self.run(request, retain_state).instrument(span).await;
        match &outcome {
            Ok(result) => run_metrics.record_success(result.processed, result.batch_files.len()),
            Err(e) => run_metrics.record_failure(&e.to_string()),
        }
        outcome
    }

    async fn run(
        &self,
        request: &CollectionRequest,
        retain_state: bool,
    ) -> CollectResult<CollectionResult> {
        if let Some((after, before)) = request.date_range() {
            if after >= before {
                return Err(CollectError::Validation(format!(
                    "created_after ({after}) must be earlier than created_before ({before})"
                )));
            }
        }

        let collection_type = request.collection_type;
        let query = request.search_query();
        let window = request.date_range().map(|(a, b)| TimeWindow::new(a, b));
        let state_path = self.state_path(request);
        info!(query = %query, batch_size = request.batch_size, "Starting collection");

        let mut state = ResumeState::new(&request.repository, collection_type, &query, window);
        let mut cursor: Option<String> = None;
        let mut batch_number = request.batch_offset;
        let mut processed = 0u64;
        let mut batch_files: Vec<String> = Vec::new();
        let mut resumed = false;

        if let Some(saved) = state_path.as_deref().and_then(ResumeState::load_if_exists) {
            if !saved.matches(&query) {
                warn!(saved_query = saved.query(), "Checkpoint belongs to a different query; starting fresh");
            } else if saved.is_completed() {
                let processed = saved.latest().map(|c| c.processed()).unwrap_or(0);
                info!(processed, "Unit already completed; reusing recorded result");
                return Ok(CollectionResult {
                    total_available: saved.total_available().unwrap_or(processed),
                    processed,
                    batch_files: saved.batch_files().to_vec(),
                    batches: saved.batch_files().len(),
                    output_dir: request.output_dir.clone(),
                    windows: 1,
                    resumed: true,
                });
            } else if let Some(checkpoint) = saved.latest().cloned() {
                info!(
                    cursor = checkpoint.cursor(),
                    batch_number = checkpoint.batch_number(),
                    processed = checkpoint.processed(),
                    "Resuming from checkpoint"
                );
                cursor = Some(checkpoint.cursor().to_string());
                batch_number = checkpoint.batch_number();
                processed = checkpoint.processed();
                batch_files = saved.batch_files().to_vec();
                resumed = true;
                state = saved;
            }
        }

        if !request.dry_run {
            if request.clean && !resumed {
                output::remove_batch_files(&request.output_dir, collection_type)?;
            }
            std::fs::create_dir_all(&request.output_dir).map_err(|e| {
                OutputError::IoError(format!(
                    "failed to create {}: {e}",
                    request.output_dir.display()
                ))
            })?;
        }

        let cap = request.max_items;
        let page_size = request.page_size();
        let mut batch_size = request.batch_size;
        let mut sized = false;
        let mut pending: PendingQueue<F::Item> = PendingQueue::new();
        let mut has_more = true;
        let mut total: Option<u64> = None;

        loop {
            self.check_cancelled()?;

            let limit = effective_target(total, cap);
            if let (Some(_), Some(limit)) = (cap, limit) {
                if processed >= limit {
                    debug!(processed, limit, "Item cap reached");
                    break;
                }
            }

            while has_more && pending.len() < batch_size {
                let limit = effective_target(total, cap);
                let outstanding =
                    limit.map(|l| l.saturating_sub(processed + pending.len() as u64));
                let size = match outstanding {
                    Some(0) if cap.is_some() => {
                        has_more = false;
                        break;
                    }
                    Some(n) if n > 0 => (page_size as u64).min(n) as usize,
                    _ => page_size,
                };

                self.check_cancelled()?;
                let page = self
                    .fetcher
                    .fetch_page(&query, size, cursor.as_deref())
                    .await
                    .map_err(CollectError::from_client)?;

                if total.is_none() {
                    if let Some(t) = page.total_count {
                        info!(total_available = t, "Provider reported total");
                        total = Some(t);
                        state.set_total_available(t);
                        if let Some(progress) = &self.progress {
                            let expected = effective_target(total, cap).unwrap_or(t);
                            progress.inc_length(expected.saturating_sub(processed));
                        }
                    }
                }

                let fetched = page.items.len();
                let stalled = fetched == 0 && page.next_cursor == cursor;
                debug!(fetched, has_more = page.has_more, "Fetched page");
                pending.extend(page.items);
                has_more = page.has_more && page.next_cursor.is_some() && !stalled;
                if stalled && page.has_more {
                    warn!("Empty page without cursor progress; treating as end of results");
                }
                cursor = page.next_cursor;
            }

            if !sized && !pending.is_empty() {
                sized = true;
                let sample = pending.peek(self.strategy.sample_size());
                let recommended = self.strategy.calculate_batch_size(&sample, request.batch_size);
                if recommended != batch_size {
                    info!(
                        strategy = self.strategy.name(),
                        from = batch_size,
                        to = recommended,
                        "Adjusted batch size"
                    );
                    batch_size = recommended;
                }
            }

            let mut max_batch = batch_size;
            if let (Some(_), Some(limit)) = (cap, effective_target(total, cap)) {
                max_batch = max_batch.min(limit.saturating_sub(processed) as usize);
            }

            let batch = self.strategy.create_batch(&mut pending, max_batch);
            if batch.is_empty() {
                break;
            }

            let batch = self.enricher.enrich(batch).await?;
            batch_number += 1;
            let item_count = batch.len();
            let metadata = batch_metadata(request, batch_number, item_count);

            if request.dry_run {
                info!(
                    file = %output::batch_filename(batch_number, collection_type),
                    items = item_count,
                    "Dry run: batch not written"
                );
            } else {
                let filename = self
                    .persister
                    .persist(&request.output_dir, &metadata, &batch)?;
                metrics::record_batch_written(collection_type.as_str(), item_count);
                info!(file = %filename, items = item_count, "Batch written");
                state.record_batch(filename.clone());
                batch_files.push(filename);
            }

            processed += item_count as u64;
            if let Some(progress) = &self.progress {
                progress.inc(item_count as u64);
            }

            if let (Some(path), Some(next)) = (&state_path, cursor.as_ref()) {
                if pending.is_empty() && has_more {
                    state.add_checkpoint(Checkpoint::new(next.clone(), batch_number, processed));
                    state.save(path)?;
                }
            }
        }

        if let Some(path) = &state_path {
            if retain_state {
                state.mark_completed(processed);
                state.save(path)?;
            } else {
                ResumeState::remove(path)?;
            }
        }

        let total_available = total.unwrap_or(processed);
        info!(
            total_available,
            processed,
            batches = batch_files.len(),
            "Collection unit finished"
        );

        Ok(CollectionResult {
            total_available,
            processed,
            batch_files,
            batches: batch_number.saturating_sub(request.batch_offset),
            output_dir: request.output_dir.clone(),
            windows: 1,
            resumed,
        })
    }
}

/// `min(total, cap)` when capped, `total` otherwise
fn effective_target(total: Option<u64>, cap: Option<u64>) -> Option<u64> {
    match (total, cap) {
        (Some(total), Some(cap)) => Some(total.min(cap)),
        (Some(total), None) => Some(total),
        (None, cap) => cap,
    }
}

fn batch_metadata(request: &CollectionRequest, index: usize, item_count: usize) -> BatchMetadata {
    let labels = request.effective_labels();
    let has_labels = !labels.is_empty();
    BatchMetadata {
        batch_index: index,
        item_count,
        collection_type: request.collection_type.as_str().to_string(),
        repository: request.repository.to_string(),
        state: request.state.as_str().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        label_filters: has_labels.then(|| labels.to_vec()),
        label_mode: has_labels.then(|| request.label_mode.as_str().to_string()),
    }
}
