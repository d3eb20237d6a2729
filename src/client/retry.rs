//! Retrying client decorator
//!
//! [`RateLimitAwareClient`] wraps any [`Transport`] and is itself a
//! [`Transport`]. Every call goes through the same loop:
//!
//! 1. Send the request.
//! 2. On success, pace if quota is low (see [`pacing_delay`]) and return.
//! 3. On a non-retryable failure (4xx other than rate limiting), return it.
//! 4. Otherwise wait ([`compute_wait`]) and try again, up to `max_retries`
//!    extra attempts. The last error is returned once the budget is spent.

use super::retry_formatter::{classify, RetryContext, RetryErrorType};
use super::{ClientError, ClientResult, RateLimitInfo, Transport};
use crate::collector::config::{
    INITIAL_RETRY_DELAY, MAX_PACING_DELAY, MAX_RESET_WAIT, MAX_RETRIES, MIN_PACING_DELAY,
    PACING_THRESHOLD, RESET_WAIT_BUFFER,
};
use crate::metrics::{self, HttpRequestMetrics};
use crate::shutdown::{self, SharedShutdown};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Transport decorator adding retry, reset-aware waiting and pacing
pub struct RateLimitAwareClient<T> {
    inner: T,
    max_retries: u32,
    initial_delay: Duration,
    pacing_threshold: u64,
    shutdown: Option<SharedShutdown>,
}

impl<T: Transport> RateLimitAwareClient<T> {
    /// Wrap `inner` with the default retry settings
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            max_retries: MAX_RETRIES,
            initial_delay: INITIAL_RETRY_DELAY,
            pacing_threshold: PACING_THRESHOLD,
            shutdown: None,
        }
    }

    /// Override the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the first retry delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Override the remaining-quota level that triggers pacing
    pub fn with_pacing_threshold(mut self, threshold: u64) -> Self {
        self.pacing_threshold = threshold;
        self
    }

    /// Attach a cancellation token checked around every sleep
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Wrapped transport
    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    async fn execute<'a, F, Fut>(&'a self, endpoint: &str, send: F) -> ClientResult<Value>
    where
        F: Fn(&'a T) -> Fut,
        Fut: std::future::Future<Output = ClientResult<Value>>,
    {
        let max_attempts = self.max_retries as usize + 1;
        let mut delay = self.initial_delay;
        let mut attempt = 0usize;
        let mut last_failure: Option<RetryContext> = None;

        loop {
            if self.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            attempt += 1;

            let request_metrics = HttpRequestMetrics::start(endpoint, attempt);
            let outcome = send(&self.inner).await;
            if let Some(info) = self.inner.last_rate_limit() {
                metrics::record_rate_limit(&info);
            }

            let err = match outcome {
                Ok(body) => {
                    request_metrics.record_complete(Some(200));
                    if let Some(mut ctx) = last_failure.take() {
                        ctx.attempt = attempt;
                        info!("{}", ctx.format_success());
                    }
                    self.pace().await?;
                    return Ok(body);
                }
                Err(e) => e,
            };
            request_metrics.record_complete(err.status());

            let error_type = classify(&err);
            if !error_type.is_retryable() {
                debug!(endpoint, error = %err, "Non-retryable failure");
                return Err(err);
            }

            let wait = compute_wait(&err, delay, chrono::Utc::now().timestamp());
            let ctx = RetryContext::new(attempt, max_attempts, &err, wait, endpoint);

            if attempt >= max_attempts {
                warn!("{}", ctx.format_failure());
                return Err(err);
            }

            warn!(
                endpoint,
                attempt,
                max_attempts,
                wait_ms = wait.as_millis() as u64,
                "{}",
                ctx.format_retry()
            );
            metrics::record_retry_backoff(wait, retry_kind(error_type));

            last_failure = Some(ctx);
            if !shutdown::sleep_or_shutdown(self.shutdown.as_ref(), wait).await {
                return Err(ClientError::Cancelled);
            }

            if error_type != RetryErrorType::RateLimit {
                delay = delay.saturating_mul(2);
            }
        }
    }

    async fn pace(&self) -> ClientResult<()> {
        let Some(info) = self.inner.last_rate_limit() else {
            return Ok(());
        };
        if info.remaining == 0 || info.remaining >= self.pacing_threshold {
            return Ok(());
        }

        let delay = pacing_delay(&info, chrono::Utc::now().timestamp());
        debug!(
            remaining = info.remaining,
            delay_ms = delay.as_millis() as u64,
            "Pacing requests while quota is low"
        );
        metrics::record_pacing(delay);

        if shutdown::sleep_or_shutdown(self.shutdown.as_ref(), delay).await {
            Ok(())
        } else {
            Err(ClientError::Cancelled)
        }
    }
}

/// Wait before retrying after `err`.
///
/// Rate-limit failures with a known reset wait until `reset + 1s`, provided
/// that is positive and no longer than an hour; everything else (and resets
/// outside that range) waits `delay`.
pub fn compute_wait(err: &ClientError, delay: Duration, now_epoch: i64) -> Duration {
    if !err.is_rate_limited() {
        return delay;
    }

    let Some(info) = err.rate_limit() else {
        return delay;
    };
    if info.reset_epoch_seconds <= 0 {
        return delay;
    }

    let wait_secs = info.seconds_until_reset(now_epoch) + RESET_WAIT_BUFFER.as_secs() as i64;
    if wait_secs > 0 && wait_secs as u64 <= MAX_RESET_WAIT.as_secs() {
        Duration::from_secs(wait_secs as u64)
    } else {
        delay
    }
}

/// Delay spreading the remaining quota evenly until the reset.
///
/// `clamp(seconds_until_reset * 1000 / remaining ms, 100ms, 10s)`; callers
/// only pace when `0 < remaining < threshold`.
pub fn pacing_delay(info: &RateLimitInfo, now_epoch: i64) -> Duration {
    let remaining = info.remaining.max(1);
    let until_reset_ms = info.seconds_until_reset(now_epoch).max(0) as u64 * 1000;
    let delay = Duration::from_millis(until_reset_ms / remaining);
    delay.clamp(MIN_PACING_DELAY, MAX_PACING_DELAY)
}

fn retry_kind(error_type: RetryErrorType) -> &'static str {
    match error_type {
        RetryErrorType::RateLimit => "rate_limit",
        RetryErrorType::ServerError(_) => "server_error",
        RetryErrorType::NetworkTimeout => "timeout",
        RetryErrorType::NetworkOffline => "connect",
        _ => "network",
    }
}

#[async_trait]
impl<T: Transport> Transport for RateLimitAwareClient<T> {
    async fn get(&self, path: &str) -> ClientResult<Value> {
        self.execute(path, |inner| inner.get(path)).await
    }

    async fn get_with_query(&self, path: &str, query: &[(&str, String)]) -> ClientResult<Value> {
        self.execute(path, |inner| inner.get_with_query(path, query))
            .await
    }

    async fn post(&self, path: &str, body: &Value) -> ClientResult<Value> {
        self.execute(path, |inner| inner.post(path, body)).await
    }

    fn last_rate_limit(&self) -> Option<RateLimitInfo> {
        self.inner.last_rate_limit()
    }
}
