//! Provider transport and collaborator interfaces
//!
//! - [`Transport`] is the raw request surface (`get`, `get_with_query`, `post`)
//!   plus the last observed [`RateLimitInfo`].
//! - [`retry::RateLimitAwareClient`] decorates any transport with retry,
//!   reset-aware waiting and proactive pacing, and is itself a [`Transport`].
//! - [`PageFetcher`] and [`RangeCounter`] are the collaborators the collector
//!   consumes; [`search::GitHubSource`] implements both on top of a transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod http;
pub mod retry;
pub mod retry_formatter;
pub mod search;

/// Client errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Request timed out before a response arrived
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection could not be established (DNS, refused, offline)
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code
        status: u16,
        /// Response body or reason phrase
        message: String,
        /// Quota headers seen on the failed response
        rate_limit: Option<RateLimitInfo>,
    },

    /// Response body could not be interpreted
    #[error("parse error: {0}")]
    Parse(String),

    /// Shutdown was requested while waiting
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    /// Status code, for HTTP failures
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Quota headers attached to the failure, if any
    pub fn rate_limit(&self) -> Option<&RateLimitInfo> {
        match self {
            ClientError::Http { rate_limit, .. } => rate_limit.as_ref(),
            _ => None,
        }
    }

    /// Whether this failure means the quota is exhausted: 429, or 403 with
    /// zero remaining requests.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ClientError::Http { status: 429, .. } => true,
            ClientError::Http {
                status: 403,
                rate_limit: Some(info),
                ..
            } => info.remaining == 0,
            _ => false,
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Quota state reported by the provider's `x-ratelimit-*` headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Requests allowed per quota window
    pub limit: u64,
    /// Requests left in the current window
    pub remaining: u64,
    /// Unix time (seconds) when the window resets
    pub reset_epoch_seconds: i64,
    /// Requests already used in the current window
    pub used: u64,
}

impl RateLimitInfo {
    /// Seconds from `now_epoch` until the reset (negative once it has passed)
    pub fn seconds_until_reset(&self, now_epoch: i64) -> i64 {
        self.reset_epoch_seconds - now_epoch
    }
}

/// Raw request surface of the provider
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET a path relative to the API base URL
    async fn get(&self, path: &str) -> ClientResult<Value>;

    /// GET with query parameters
    async fn get_with_query(&self, path: &str, query: &[(&str, String)]) -> ClientResult<Value>;

    /// POST a JSON body
    async fn post(&self, path: &str, body: &Value) -> ClientResult<Value>;

    /// Quota state from the most recent response, success or failure
    fn last_rate_limit(&self) -> Option<RateLimitInfo>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn get(&self, path: &str) -> ClientResult<Value> {
        (**self).get(path).await
    }

    async fn get_with_query(&self, path: &str, query: &[(&str, String)]) -> ClientResult<Value> {
        (**self).get_with_query(path, query).await
    }

    async fn post(&self, path: &str, body: &Value) -> ClientResult<Value> {
        (**self).post(path, body).await
    }

    fn last_rate_limit(&self) -> Option<RateLimitInfo> {
        (**self).last_rate_limit()
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult<T> {
    /// Items in provider order
    pub items: Vec<T>,
    /// Opaque token for the next page; only ever handed back to the fetcher
    pub next_cursor: Option<String>,
    /// Whether another page is available
    pub has_more: bool,
    /// Total matches for the query, when the endpoint reports it
    pub total_count: Option<u64>,
}

impl<T> SearchResult<T> {
    /// A final page with no continuation
    pub fn last(items: Vec<T>, total_count: Option<u64>) -> Self {
        Self {
            items,
            next_cursor: None,
            has_more: false,
            total_count,
        }
    }
}

/// Fetches one page of a query
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Item type produced by this fetcher
    type Item: Send;

    /// Fetch up to `page_size` items; `cursor` is `None` for the first page
    async fn fetch_page(
        &self,
        query: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> ClientResult<SearchResult<Self::Item>>;
}

/// Counts matches of a query without fetching them
#[async_trait]
pub trait RangeCounter: Send + Sync {
    /// Total number of items matching `query`
    async fn count(&self, query: &str) -> ClientResult<u64>;
}
