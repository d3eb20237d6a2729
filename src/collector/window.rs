//! Date-window planning
//!
//! The search endpoint returns at most 1,000 results per query. A range whose
//! count exceeds `max_per_window` is halved repeatedly until each piece fits,
//! or until a piece is a single day and cannot shrink further.

use super::config::MAX_PER_WINDOW;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tracing::{debug, warn};

/// Half-open date range `[after, before)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start
    pub after: NaiveDate,
    /// Exclusive end
    pub before: NaiveDate,
}

impl TimeWindow {
    /// Window covering `[after, before)`
    pub fn new(after: NaiveDate, before: NaiveDate) -> Self {
        Self { after, before }
    }

    /// Span in whole days
    pub fn days(&self) -> i64 {
        (self.before - self.after).num_days()
    }

    /// Split at `after + floor(days / 2)`
    pub fn split(&self) -> (TimeWindow, TimeWindow) {
        let mid = self.after + Duration::days(self.days() / 2);
        (
            TimeWindow::new(self.after, mid),
            TimeWindow::new(mid, self.before),
        )
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.after, self.before)
    }
}

/// Recursive range splitter
#[derive(Debug, Clone, Copy)]
pub struct WindowPlanner {
    max_per_window: u64,
}

impl Default for WindowPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowPlanner {
    /// Planner with the default limit
    pub fn new() -> Self {
        Self {
            max_per_window: MAX_PER_WINDOW,
        }
    }

    /// Override the per-window limit
    pub fn with_max_per_window(mut self, max: u64) -> Self {
        self.max_per_window = max;
        self
    }

    /// Per-window limit
    pub fn max_per_window(&self) -> u64 {
        self.max_per_window
    }

    /// Partition `[after, before)` into windows whose counts fit the limit.
    ///
    /// Windows come back in chronological order and cover the range exactly.
    /// `count` is queried once per visited node; a failed count emits that
    /// window unsplit. An empty or inverted range yields no windows.
    pub async fn plan_windows<F, Fut, E>(
        &self,
        after: NaiveDate,
        before: NaiveDate,
        mut count: F,
    ) -> Vec<TimeWindow>
    where
        F: FnMut(NaiveDate, NaiveDate) -> Fut,
        Fut: Future<Output = Result<u64, E>>,
        E: fmt::Display,
    {
        let mut windows = Vec::new();
        if after >= before {
            return windows;
        }

        // Depth-first; the right half is pushed first so the left is visited first.
        let mut stack = vec![TimeWindow::new(after, before)];
        while let Some(window) = stack.pop() {
            let total = match count(window.after, window.before).await {
                Ok(total) => total,
                Err(e) => {
                    warn!(window = %window, error = %e, "Count query failed; keeping window unsplit");
                    windows.push(window);
                    continue;
                }
            };

            if total <= self.max_per_window {
                debug!(window = %window, count = total, "Window fits");
                windows.push(window);
                continue;
            }

            if window.days() <= 1 {
                warn!(
                    window = %window,
                    count = total,
                    limit = self.max_per_window,
                    "Single-day window exceeds the limit; results will be truncated"
                );
                windows.push(window);
                continue;
            }

            let (left, right) = window.split();
            debug!(window = %window, count = total, mid = %left.before, "Splitting window");
            stack.push(right);
            stack.push(left);
        }

        windows
    }
}
