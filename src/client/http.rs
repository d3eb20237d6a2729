//! reqwest-backed transport
//!
//! Performs exactly one request per call; retries belong to
//! [`super::retry::RateLimitAwareClient`]. Quota headers are captured from
//! every response, successful or not.

use super::{ClientError, ClientResult, RateLimitInfo, Transport};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Default API base URL
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("repo-data-collector/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Single-attempt HTTP transport
pub struct HttpTransport {
    client: Client,
    base_url: String,
    last_rate_limit: Mutex<Option<RateLimitInfo>>,
}

impl HttpTransport {
    /// Create a transport for `base_url`, authenticating with `token` when given
    pub fn new(base_url: impl Into<String>, token: Option<&str>) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        if let Some(token) = token {
            let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ClientError::Network(format!("invalid token header: {e}")))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            last_rate_limit: Mutex::new(None),
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    fn store_rate_limit(&self, info: Option<RateLimitInfo>) {
        if let Ok(mut guard) = self.last_rate_limit.lock() {
            *guard = info;
        }
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Value> {
        let response = request.send().await.map_err(map_reqwest_error)?;

        let rate_limit = parse_rate_limit(response.headers());
        self.store_rate_limit(rate_limit);

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .ok()
                .map(|body| error_message(&body))
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            debug!(status = status.as_u16(), message = %message, "Request failed");
            return Err(ClientError::Http {
                status: status.as_u16(),
                message,
                rate_limit,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ClientError::Parse(format!("failed to decode response body: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> ClientResult<Value> {
        self.send(self.client.get(self.url(path))).await
    }

    async fn get_with_query(&self, path: &str, query: &[(&str, String)]) -> ClientResult<Value> {
        self.send(self.client.get(self.url(path)).query(query)).await
    }

    async fn post(&self, path: &str, body: &Value) -> ClientResult<Value> {
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    fn last_rate_limit(&self) -> Option<RateLimitInfo> {
        self.last_rate_limit.lock().ok().and_then(|guard| *guard)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout(e.to_string())
    } else if e.is_connect() {
        ClientError::Connect(e.to_string())
    } else {
        ClientError::Network(e.to_string())
    }
}

/// Pull the provider's `message` field out of an error body, if it has one
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Parse `x-ratelimit-*` headers. `remaining` and `reset` are required;
/// `limit` and `used` default to zero when absent.
pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let remaining = header_number::<u64>(headers, "x-ratelimit-remaining")?;
    let reset_epoch_seconds = header_number::<i64>(headers, "x-ratelimit-reset")?;
    let limit = header_number::<u64>(headers, "x-ratelimit-limit").unwrap_or(0);
    let used = header_number::<u64>(headers, "x-ratelimit-used").unwrap_or(0);

    Some(RateLimitInfo {
        limit,
        remaining,
        reset_epoch_seconds,
        used,
    })
}

fn header_number<N: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<N> {
    let raw = headers.get(name)?.to_str().ok()?;
    match raw.trim().parse::<N>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(header = name, value = raw, "Ignoring unparsable rate limit header");
            None
        }
    }
}
