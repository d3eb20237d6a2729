//! End-to-end collection against a mock search endpoint

use repo_data_collector::client::http::HttpTransport;
use repo_data_collector::client::retry::RateLimitAwareClient;
use repo_data_collector::client::search::GitHubSource;
use repo_data_collector::client::ClientError;
use repo_data_collector::collector::{CollectError, CollectionOrchestrator, CollectionRequest};
use repo_data_collector::output::json::JsonBatchWriter;
use repo_data_collector::verify::VerificationEngine;
use repo_data_collector::{CollectionType, RepositoryId};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn issues(range: std::ops::Range<u64>) -> Vec<Value> {
    range
        .map(|n| {
            json!({
                "number": n,
                "title": format!("issue {n}"),
                "state": "open",
                "created_at": "2023-06-01T10:00:00Z",
            })
        })
        .collect()
}

fn search_body(total: u64, items: Vec<Value>) -> Value {
    json!({"total_count": total, "incomplete_results": false, "items": items})
}

fn source(server: &MockServer) -> GitHubSource<RateLimitAwareClient<HttpTransport>> {
    let transport = HttpTransport::new(server.uri(), Some("test-token")).unwrap();
    let client = RateLimitAwareClient::new(transport).with_initial_delay(Duration::from_millis(10));
    GitHubSource::new(Arc::new(client), CollectionType::Issues)
}

fn request(dir: &Path) -> CollectionRequest {
    CollectionRequest::builder(RepositoryId::parse("org/repo").unwrap(), CollectionType::Issues)
        .state("open")
        .output_dir(dir)
        .build()
        .validated()
}

#[tokio::test]
async fn test_collects_all_pages_with_aligned_page_sizes() {
    let server = MockServer::start().await;

    // transient failure on the first request
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param("q", "repo:org/repo is:issue is:open sort:created-desc"))
        .and(query_param("per_page", "100"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(150, issues(1..101))))
        .expect(1)
        .mount(&server)
        .await;

    // the last 50 are read as page 3 of 50 so nothing is fetched twice
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param("per_page", "50"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(150, issues(101..151))))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let orchestrator = CollectionOrchestrator::new(source(&server), JsonBatchWriter::new());
    let result = orchestrator.collect(&request(dir.path())).await.unwrap();

    assert_eq!(result.total_available, 150);
    assert_eq!(result.processed, 150);
    assert_eq!(
        result.batch_files,
        vec!["batch_001_issues.json", "batch_002_issues.json"]
    );

    let second: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("batch_002_issues.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(second["metadata"]["item_count"], json!(50));
    assert_eq!(second["issues"][0]["number"], json!(101));

    let report = VerificationEngine::new()
        .verify(
            dir.path(),
            CollectionType::Issues,
            Some(repo_data_collector::ItemState::Open),
            None,
            None,
        )
        .unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_not_found_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let orchestrator = CollectionOrchestrator::new(source(&server), JsonBatchWriter::new());
    let err = orchestrator
        .collect(&request(dir.path()))
        .await
        .unwrap_err();

    match err {
        CollectError::Client(ClientError::Http { status, message, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Not Found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_releases_use_list_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/org/repo/releases"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "tag_name": "v1.0.0", "created_at": "2023-01-10T00:00:00Z"},
            {"id": 2, "tag_name": "v1.1.0", "created_at": "2023-02-10T00:00:00Z"},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri(), None).unwrap();
    let source = GitHubSource::new(
        Arc::new(RateLimitAwareClient::new(transport)),
        CollectionType::Releases,
    );
    let dir = TempDir::new().unwrap();
    let request =
        CollectionRequest::builder(RepositoryId::parse("org/repo").unwrap(), CollectionType::Releases)
            .output_dir(dir.path())
            .build()
            .validated();

    let result = CollectionOrchestrator::new(source, JsonBatchWriter::new())
        .collect(&request)
        .await
        .unwrap();
    assert_eq!(result.processed, 2);
    assert_eq!(result.batch_files, vec!["batch_001_releases.json"]);
}
