//! Retry classification and log message formatting.
//!
//! [`classify`] maps a [`ClientError`] onto a [`RetryErrorType`], which decides
//! retryability; [`RetryContext`] renders the attempt/failure lines the
//! retrying client logs.

use super::ClientError;
use std::time::Duration;

/// Classification of request failures for retry decisions and user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request timed out
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// Quota exhausted (429, or 403 with zero remaining)
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 400/422, malformed query
    InvalidRequest,
    /// Authentication or permission failures (401/403)
    AuthFailed(u16),
    /// Other 4xx
    ClientError(u16),
    /// Response body could not be interpreted
    MalformedResponse,
    /// Shutdown requested mid-request
    Cancelled,
    /// Generic fallback for transport errors
    NetworkGeneric,
}

impl RetryErrorType {
    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::InvalidRequest => "invalid query",
            Self::AuthFailed(401) => "authentication failed (401)",
            Self::AuthFailed(403) => "permission denied (403)",
            Self::AuthFailed(_) => "authentication failed",
            Self::ClientError(404) => "repository not found",
            Self::ClientError(410) => "resource gone",
            Self::ClientError(_) => "client error",
            Self::MalformedResponse => "malformed response",
            Self::Cancelled => "cancelled",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation shown after the final failure.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection and firewall settings",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Provide a token with --token or GITHUB_TOKEN for a higher quota",
            Self::ServerError(_) => "The API may be degraded, try again later",
            Self::InvalidRequest => "Check the label, state and date arguments for typos",
            Self::AuthFailed(_) => "Verify the token is valid and can read the repository",
            Self::ClientError(_) => "Check that the repository exists and is visible to the token",
            Self::MalformedResponse => "Check --api-url points at a compatible API",
            Self::Cancelled => "Re-run the command to continue",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }

    /// Whether a failure of this type is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RetryErrorType::InvalidRequest
                | RetryErrorType::AuthFailed(_)
                | RetryErrorType::ClientError(_)
                | RetryErrorType::MalformedResponse
                | RetryErrorType::Cancelled
        )
    }
}

/// Classify a client error.
pub fn classify(err: &ClientError) -> RetryErrorType {
    if err.is_rate_limited() {
        return RetryErrorType::RateLimit;
    }

    match err {
        ClientError::Http { status, .. } => match *status {
            400 | 422 => RetryErrorType::InvalidRequest,
            401 | 403 => RetryErrorType::AuthFailed(*status),
            s if (500..600).contains(&s) => RetryErrorType::ServerError(s),
            s if (400..500).contains(&s) => RetryErrorType::ClientError(s),
            _ => RetryErrorType::NetworkGeneric,
        },
        ClientError::Timeout(_) => RetryErrorType::NetworkTimeout,
        ClientError::Connect(_) => RetryErrorType::NetworkOffline,
        ClientError::Network(_) => RetryErrorType::NetworkGeneric,
        ClientError::Parse(_) => RetryErrorType::MalformedResponse,
        ClientError::Cancelled => RetryErrorType::Cancelled,
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempt that just failed (1-based)
    pub attempt: usize,
    /// Maximum number of attempts configured
    pub max_attempts: usize,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Wait before the next attempt
    pub backoff_duration: Duration,
    /// Endpoint path that failed
    pub endpoint: String,
    /// Original error message
    pub error_message: String,
}

impl RetryContext {
    /// Build a context for one failed attempt.
    pub fn new(
        attempt: usize,
        max_attempts: usize,
        err: &ClientError,
        backoff_duration: Duration,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: classify(err),
            backoff_duration,
            endpoint: endpoint.into(),
            error_message: err.to_string(),
        }
    }

    /// Format standardized retry message with attempt counters.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64(),
            self.endpoint
        )
    }

    /// Format the line logged when a retried request finally succeeds.
    pub fn format_success(&self) -> String {
        format!(
            "Retry attempt {}/{} succeeded ({})",
            self.attempt, self.max_attempts, self.endpoint
        )
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!("[FAILED] Request failed after {} attempts", self.attempt),
            format!("  Last error: {}", self.error_message),
            format!("  Endpoint: {}", self.endpoint),
            "  Suggestions:".to_string(),
        ];
        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }
        lines.join("\n")
    }

    /// Suggestions tailored to the failure.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.error_type.suggestion().to_string()];
        if self.error_type.is_retryable() {
            suggestions.push(format!(
                "Try increasing --max-retries (current: {})",
                self.max_attempts.saturating_sub(1)
            ));
        }
        suggestions
    }
}
