//! Window-by-window collection with contiguous batch numbering

use super::orchestrator::CollectionOrchestrator;
use super::request::{CollectionRequest, CollectionResult};
use super::window::{TimeWindow, WindowPlanner};
use super::{BatchEnricher, CollectResult};
use crate::client::{PageFetcher, RangeCounter};
use crate::output::BatchPersister;
use serde::Serialize;
use tracing::{info, Instrument};

/// Splits a date-bounded request into windows small enough for the provider
/// cap and runs the orchestrator over them in order
pub struct WindowedCollector<F: PageFetcher, P, E, C> {
    orchestrator: CollectionOrchestrator<F, P, E>,
    counter: C,
    planner: WindowPlanner,
}

impl<F: PageFetcher, P, E, C> WindowedCollector<F, P, E, C> {
    /// Collector with the default planner
    pub fn new(orchestrator: CollectionOrchestrator<F, P, E>, counter: C) -> Self {
        Self {
            orchestrator,
            counter,
            planner: WindowPlanner::new(),
        }
    }

    /// Replace the window planner
    pub fn with_planner(mut self, planner: WindowPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Orchestrator that runs each window
    pub fn orchestrator(&self) -> &CollectionOrchestrator<F, P, E> {
        &self.orchestrator
    }
}

impl<F, P, E, C> WindowedCollector<F, P, E, C>
where
    F: PageFetcher,
    F::Item: Serialize + Sync + 'static,
    P: BatchPersister<F::Item>,
    E: BatchEnricher<F::Item>,
    C: RangeCounter,
{
    /// Collect `request`, windowing it when the date range is too large for
    /// a single query.
    ///
    /// Requests without both date bounds, for list-endpoint types, or that
    /// plan to a single window go straight to the orchestrator.
    pub async fn collect(&self, request: &CollectionRequest) -> CollectResult<CollectionResult> {
        let (after, before) = match request.date_range() {
            Some(range) if request.collection_type.is_searchable() => range,
            _ => return self.orchestrator.collect(request).await,
        };

        let counter = &self.counter;
        let windows = self
            .planner
            .plan_windows(after, before, |a, b| {
                let query = request
                    .for_window(&TimeWindow::new(a, b), false, 0)
                    .search_query();
                async move { counter.count(&query).await }
            })
            .await;

        if windows.len() <= 1 {
            return self.orchestrator.collect(request).await;
        }

        info!(
            windows = windows.len(),
            limit = self.planner.max_per_window(),
            "Range exceeds the per-query cap; collecting in windows"
        );

        let mut combined = CollectionResult::default();
        let mut units = Vec::with_capacity(windows.len());

        for (index, window) in windows.iter().enumerate() {
            let offset = request.batch_offset + combined.batches;
            let mut unit = request.for_window(window, request.clean && index == 0, offset);

            if let Some(cap) = request.max_items {
                let left = cap.saturating_sub(combined.processed);
                if left == 0 {
                    info!(cap, "Item cap reached; skipping remaining windows");
                    break;
                }
                unit.max_items = Some(left);
            }

            let span = tracing::info_span!(
                "window",
                index = index + 1,
                of = windows.len(),
                range = %window,
            );
            let result = self
                .orchestrator
                .collect_unit(&unit, true)
                .instrument(span)
                .await?;

            info!(
                window = %window,
                processed = result.processed,
                batches = result.batch_files.len(),
                "Window complete"
            );
            combined.absorb(result);
            units.push(unit);
        }

        for unit in &units {
            self.orchestrator.discard_resume_state(unit)?;
        }

        info!(
            windows = combined.windows,
            processed = combined.processed,
            batches = combined.batch_files.len(),
            "Windowed collection complete"
        );
        Ok(combined)
    }
}
