//! Cancellation behaviour of the shutdown coordinator, the retrying client
//! and the collection loop

use super::support::DaySource;
use async_trait::async_trait;
use repo_data_collector::client::retry::RateLimitAwareClient;
use repo_data_collector::client::{ClientError, ClientResult, RateLimitInfo, Transport};
use repo_data_collector::collector::{CollectError, CollectionOrchestrator, CollectionRequest};
use repo_data_collector::output::json::JsonBatchWriter;
use repo_data_collector::shutdown::{sleep_or_shutdown, ShutdownCoordinator};
use repo_data_collector::{CollectionType, RepositoryId};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Transport whose every call fails with a retryable 503
#[derive(Default)]
struct Unavailable {
    calls: AtomicUsize,
}

impl Unavailable {
    fn fail(&self) -> ClientResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ClientError::Http {
            status: 503,
            message: "Service Unavailable".into(),
            rate_limit: None,
        })
    }
}

#[async_trait]
impl Transport for Unavailable {
    async fn get(&self, _path: &str) -> ClientResult<Value> {
        self.fail()
    }

    async fn get_with_query(&self, _path: &str, _query: &[(&str, String)]) -> ClientResult<Value> {
        self.fail()
    }

    async fn post(&self, _path: &str, _body: &Value) -> ClientResult<Value> {
        self.fail()
    }

    fn last_rate_limit(&self) -> Option<RateLimitInfo> {
        None
    }
}

#[tokio::test]
async fn test_all_waiters_released() {
    let shutdown = ShutdownCoordinator::shared();
    let mut waiters = Vec::new();
    for _ in 0..3 {
        let handle = shutdown.clone();
        waiters.push(tokio::spawn(async move { handle.wait_for_shutdown().await }));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.request_shutdown();
    // a second request is harmless
    shutdown.request_shutdown();

    for waiter in waiters {
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should be released")
            .unwrap();
    }
    assert!(shutdown.is_shutdown_requested());
}

#[tokio::test]
async fn test_wait_returns_immediately_once_requested() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();
    tokio::time::timeout(Duration::from_millis(100), shutdown.wait_for_shutdown())
        .await
        .expect("already shut down");
}

#[tokio::test(start_paused = true)]
async fn test_sleep_or_shutdown_cut_short() {
    let shutdown = ShutdownCoordinator::shared();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        trigger.request_shutdown();
    });

    let start = tokio::time::Instant::now();
    assert!(!sleep_or_shutdown(Some(&shutdown), Duration::from_secs(600)).await);
    assert!(start.elapsed() < Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_interrupted_by_shutdown() {
    let shutdown = ShutdownCoordinator::shared();
    let client = RateLimitAwareClient::new(Unavailable::default())
        .with_max_retries(10)
        .with_initial_delay(Duration::from_secs(30))
        .with_shutdown(shutdown.clone());

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.request_shutdown();
    });

    let err = client.get("/search/issues").await.unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(client.inner().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_request_after_shutdown() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();
    let client = RateLimitAwareClient::new(Unavailable::default()).with_shutdown(shutdown);

    let err = client.get("/rate_limit").await.unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(client.inner().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_collection_keeps_written_batches() {
    let dir = TempDir::new().unwrap();
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let request =
        CollectionRequest::builder(RepositoryId::parse("org/repo").unwrap(), CollectionType::Issues)
            .created_after("2023-01-01")
            .created_before("2023-01-11")
            .output_dir(dir.path())
            .build()
            .validated();

    // a first run writes something
    let source = DaySource::uniform(10);
    CollectionOrchestrator::new(source.clone(), JsonBatchWriter::new())
        .collect(&request)
        .await
        .unwrap();
    assert!(dir.path().join("batch_001_issues.json").exists());

    let fetches = source.fetches();
    let err = CollectionOrchestrator::new(source.clone(), JsonBatchWriter::new())
        .with_shutdown(shutdown)
        .collect(&request)
        .await
        .unwrap_err();
    assert!(matches!(err, CollectError::Cancelled));
    assert_eq!(source.fetches(), fetches);
    assert!(dir.path().join("batch_001_issues.json").exists());
}
