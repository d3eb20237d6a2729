//! Collection run metrics
//!
//! Counters and histograms for requests, retries, quota pacing and written
//! batches, emitted through the `metrics` facade. Without an installed
//! recorder every call is a no-op; `init_metrics` installs a Prometheus
//! scrape endpoint.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::client::RateLimitInfo;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

static CORRELATION_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

/// Errors from metrics initialization
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The Prometheus exporter could not be installed
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}

/// Install the Prometheus exporter on `addr`.
///
/// Idempotent: later calls are ignored once an exporter is running.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(MetricsError::Install(e.to_string()));
    }

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of API requests, labeled by status"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "API request duration in seconds"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of retry attempts, labeled by failure kind"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Wait before each retry"
    );
    describe_histogram!(
        "rate_limit_pacing_seconds",
        Unit::Seconds,
        "Proactive delay inserted while quota is low"
    );
    describe_gauge!(
        "rate_limit_remaining",
        Unit::Count,
        "Requests remaining in the current quota window"
    );
    describe_counter!(
        "batches_written_total",
        Unit::Count,
        "Batch files persisted"
    );
    describe_counter!(
        "items_processed_total",
        Unit::Count,
        "Items written to batch files"
    );
    describe_counter!(
        "collections_completed_total",
        Unit::Count,
        "Collection runs that finished successfully"
    );
    describe_counter!(
        "collections_failed_total",
        Unit::Count,
        "Collection runs that ended with an error"
    );

    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Whether `init_metrics` has installed an exporter
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one API request attempt
pub struct HttpRequestMetrics {
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
    attempt: usize,
}

impl HttpRequestMetrics {
    /// Start recording a request attempt (1-based)
    pub fn start(endpoint: impl Into<String>, attempt: usize) -> Self {
        let endpoint = endpoint.into();
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            attempt,
            "Starting API request"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record the outcome; `status` is `None` for transport failures
    pub fn record_complete(&self, status: Option<u16>) {
        let duration = self.start_time.elapsed();
        let status_label = status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "network_error".to_string());

        counter!("http_requests_total", "status" => status_label.clone()).increment(1);
        histogram!("http_request_duration_seconds").record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            status = %status_label,
            duration_ms = duration.as_millis() as u64,
            "API request completed"
        );
    }

    /// Correlation ID for this attempt
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a retry and the wait preceding it
pub fn record_retry_backoff(duration: Duration, kind: &'static str) {
    counter!("http_retries_total", "kind" => kind).increment(1);
    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());
}

/// Record the latest quota state
pub fn record_rate_limit(info: &RateLimitInfo) {
    gauge!("rate_limit_remaining").set(info.remaining as f64);
    warn_if_exhausted(info);

    if info.limit > 0 && info.remaining * 10 < info.limit {
        debug!(
            remaining = info.remaining,
            limit = info.limit,
            "Quota below 10%"
        );
    }
}

/// Record a proactive pacing delay
pub fn record_pacing(duration: Duration) {
    histogram!("rate_limit_pacing_seconds").record(duration.as_secs_f64());
}

/// Record a persisted batch
pub fn record_batch_written(collection_type: &'static str, items: usize) {
    counter!("batches_written_total", "collection_type" => collection_type).increment(1);
    counter!("items_processed_total").increment(items as u64);
}

/// Start-to-finish tracking of one collection run
pub struct CollectionMetrics {
    collection_type: &'static str,
    repository: String,
    start_time: Instant,
}

impl CollectionMetrics {
    /// Start tracking a run
    pub fn start(collection_type: &'static str, repository: impl Into<String>) -> Self {
        let repository = repository.into();
        info!(
            collection_type,
            repository = %repository,
            "Collection started"
        );
        Self {
            collection_type,
            repository,
            start_time: Instant::now(),
        }
    }

    /// Record successful completion
    pub fn record_success(&self, processed: u64, batches: usize) {
        counter!(
            "collections_completed_total",
            "collection_type" => self.collection_type,
        )
        .increment(1);

        info!(
            collection_type = self.collection_type,
            repository = %self.repository,
            processed,
            batches,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Collection completed successfully"
        );
    }

    /// Record failure
    pub fn record_failure(&self, error: &str) {
        counter!(
            "collections_failed_total",
            "collection_type" => self.collection_type,
        )
        .increment(1);

        error!(
            collection_type = self.collection_type,
            repository = %self.repository,
            error = %error,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Collection failed"
        );
    }
}

/// Warn once quota is fully exhausted
fn warn_if_exhausted(info: &RateLimitInfo) {
    if info.remaining == 0 {
        warn!(
            reset_epoch = info.reset_epoch_seconds,
            limit = info.limit,
            "API quota exhausted"
        );
    }
}
