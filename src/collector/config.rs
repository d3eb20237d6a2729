//! Collection configuration constants

use std::time::Duration;

/// Maximum number of retries after the first failed attempt.
pub const MAX_RETRIES: u32 = 3;

/// Delay before the first retry; doubles after each non-rate-limit failure.
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Longest reset wait honored; later resets fall back to the exponential delay.
pub const MAX_RESET_WAIT: Duration = Duration::from_secs(3600);

/// Added to the reset epoch before retrying a rate-limited request.
pub const RESET_WAIT_BUFFER: Duration = Duration::from_secs(1);

/// Remaining-quota level below which successful requests are paced.
pub const PACING_THRESHOLD: u64 = 100;

/// Lower bound of a pacing delay.
pub const MIN_PACING_DELAY: Duration = Duration::from_millis(100);

/// Upper bound of a pacing delay.
pub const MAX_PACING_DELAY: Duration = Duration::from_secs(10);

/// Largest count a window may hold before the planner splits it.
/// Kept under [`PROVIDER_RESULT_CAP`] as a safety margin.
pub const MAX_PER_WINDOW: u64 = 900;

/// Hard cap on results the search endpoint returns for one query.
pub const PROVIDER_RESULT_CAP: u64 = 1000;

/// Items per batch file.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Largest page the provider serves.
pub const MAX_PAGE_SIZE: usize = 100;

/// Average serialized item size (bytes) above which adaptive batching halves.
pub const LARGE_ITEM_BYTES: usize = 50_000;

/// Items sampled when estimating serialized size.
pub const SAMPLE_SIZE: usize = 10;

/// Provider page size for a requested batch size
pub fn page_size_for(batch_size: usize) -> usize {
    batch_size.clamp(1, MAX_PAGE_SIZE)
}
