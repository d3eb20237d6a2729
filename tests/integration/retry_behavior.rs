//! Integration tests for retry, reset-aware waiting and pacing
//!
//! Time is paused, so the gaps between attempts are exactly the waits the
//! client chose.

use async_trait::async_trait;
use repo_data_collector::client::retry::{compute_wait, RateLimitAwareClient};
use repo_data_collector::client::{ClientError, ClientResult, RateLimitInfo, Transport};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Transport replaying a fixed script of outcomes
struct ScriptedTransport {
    script: Mutex<VecDeque<ClientResult<Value>>>,
    calls: Mutex<Vec<Instant>>,
    rate_limit: Option<RateLimitInfo>,
}

impl ScriptedTransport {
    fn new(script: Vec<ClientResult<Value>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            rate_limit: None,
        }
    }

    fn with_rate_limit(mut self, info: RateLimitInfo) -> Self {
        self.rate_limit = Some(info);
        self
    }

    fn attempts(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn next(&self) -> ClientResult<Value> {
        self.calls.lock().unwrap().push(Instant::now());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(server_error()))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, _path: &str) -> ClientResult<Value> {
        self.next()
    }

    async fn get_with_query(&self, _path: &str, _query: &[(&str, String)]) -> ClientResult<Value> {
        self.next()
    }

    async fn post(&self, _path: &str, _body: &Value) -> ClientResult<Value> {
        self.next()
    }

    fn last_rate_limit(&self) -> Option<RateLimitInfo> {
        self.rate_limit
    }
}

fn server_error() -> ClientError {
    ClientError::Http {
        status: 503,
        message: "Service Unavailable".into(),
        rate_limit: None,
    }
}

fn quota(remaining: u64, reset_in: i64) -> RateLimitInfo {
    RateLimitInfo {
        limit: 5000,
        remaining,
        reset_epoch_seconds: chrono::Utc::now().timestamp() + reset_in,
        used: 5000 - remaining,
    }
}

fn exhausted(reset_in: i64) -> ClientError {
    ClientError::Http {
        status: 403,
        message: "API rate limit exceeded".into(),
        rate_limit: Some(quota(0, reset_in)),
    }
}

fn assert_near(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(50),
        "expected ~{expected:?}, got {actual:?}"
    );
}

fn client(transport: ScriptedTransport) -> RateLimitAwareClient<ScriptedTransport> {
    RateLimitAwareClient::new(transport)
        .with_max_retries(3)
        .with_initial_delay(Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_between_attempts() {
    let client = client(ScriptedTransport::new(vec![
        Err(server_error()),
        Err(server_error()),
        Ok(json!({"ok": true})),
    ]));

    let body = client.get("/search/issues").await.unwrap();
    assert_eq!(body, json!({"ok": true}));
    assert_eq!(client.inner().attempts(), 3);

    let gaps = client.inner().gaps();
    assert_near(gaps[0], Duration::from_secs(1));
    assert_near(gaps[1], Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_budget_exhaustion_returns_last_error() {
    let client = client(ScriptedTransport::new(Vec::new()));

    let err = client.get("/search/issues").await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(client.inner().attempts(), 4);

    let gaps = client.inner().gaps();
    assert_near(gaps[2], Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_client_errors_are_not_retried() {
    let client = client(ScriptedTransport::new(vec![Err(ClientError::Http {
        status: 404,
        message: "Not Found".into(),
        rate_limit: None,
    })]));

    let err = client.get("/repos/org/missing").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(client.inner().attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_without_exhaustion_is_fatal() {
    let client = client(ScriptedTransport::new(vec![Err(ClientError::Http {
        status: 403,
        message: "Resource not accessible".into(),
        rate_limit: Some(quota(4000, 600)),
    })]));

    assert!(client.get("/repos/org/private").await.is_err());
    assert_eq!(client.inner().attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_quota_waits_for_reset() {
    let client = client(ScriptedTransport::new(vec![
        Err(exhausted(30)),
        Ok(json!({"items": []})),
    ]));

    client.get("/search/issues").await.unwrap();
    let gap = client.inner().gaps()[0];
    assert!(
        gap >= Duration::from_secs(29) && gap <= Duration::from_secs(32),
        "waited {gap:?}"
    );
}

#[test]
fn test_reset_aware_wait_value() {
    let now = 1_700_000_000;
    let err = ClientError::Http {
        status: 429,
        message: "slow down".into(),
        rate_limit: Some(RateLimitInfo {
            limit: 5000,
            remaining: 0,
            reset_epoch_seconds: now + 30,
            used: 5000,
        }),
    };
    assert_eq!(
        compute_wait(&err, Duration::from_secs(1), now),
        Duration::from_secs(31)
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_without_reset_does_not_double() {
    let client = client(ScriptedTransport::new(vec![
        Err(ClientError::Http {
            status: 429,
            message: "Too Many Requests".into(),
            rate_limit: None,
        }),
        Err(server_error()),
        Ok(json!({})),
    ]));

    client.get("/search/issues").await.unwrap();
    let gaps = client.inner().gaps();
    assert_near(gaps[0], Duration::from_secs(1));
    assert_near(gaps[1], Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_low_quota_paces_after_success() {
    let client = client(
        ScriptedTransport::new(vec![Ok(json!({}))]).with_rate_limit(quota(50, 3600)),
    );

    let start = Instant::now();
    client.get("/search/issues").await.unwrap();
    assert_near(start.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_healthy_quota_does_not_pace() {
    let client = client(
        ScriptedTransport::new(vec![Ok(json!({}))]).with_rate_limit(quota(4000, 3600)),
    );

    let start = Instant::now();
    client.get("/search/issues").await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(10));
}
