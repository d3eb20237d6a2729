//! Unit tests for the reqwest transport against a mock server

use repo_data_collector::client::http::HttpTransport;
use repo_data_collector::client::{ClientError, Transport};
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn quota(remaining: u64) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("x-ratelimit-limit", "30")
        .insert_header("x-ratelimit-remaining", remaining.to_string().as_str())
        .insert_header("x-ratelimit-reset", "1704067200")
        .insert_header("x-ratelimit-used", (30 - remaining).to_string().as_str())
}

#[tokio::test]
async fn test_sends_auth_and_accept_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(header("authorization", "Bearer secret"))
        .and(header("accept", "application/vnd.github+json"))
        .and(header_exists("user-agent"))
        .and(query_param("q", "repo:org/repo is:issue"))
        .respond_with(quota(29).set_body_json(json!({"total_count": 0, "items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri(), Some("secret")).unwrap();
    let body = transport
        .get_with_query("/search/issues", &[("q", "repo:org/repo is:issue".to_string())])
        .await
        .unwrap();
    assert_eq!(body["total_count"], json!(0));

    let info = transport.last_rate_limit().unwrap();
    assert_eq!(info.limit, 30);
    assert_eq!(info.remaining, 29);
    assert_eq!(info.used, 1);
    assert_eq!(info.reset_epoch_seconds, 1_704_067_200);
}

#[tokio::test]
async fn test_anonymous_requests_have_no_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri(), None).unwrap();
    transport.get("/rate_limit").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
    assert!(transport.last_rate_limit().is_none());
}

#[tokio::test]
async fn test_error_carries_status_message_and_quota() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "1704067200")
                .set_body_json(json!({"message": "API rate limit exceeded"})),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri(), None).unwrap();
    let err = transport.get("/search/issues").await.unwrap_err();

    assert_eq!(err.status(), Some(403));
    assert!(err.is_rate_limited());
    assert!(err.to_string().contains("API rate limit exceeded"));
    assert_eq!(err.rate_limit().unwrap().remaining, 0);
    // quota headers are kept from failed responses too
    assert_eq!(transport.last_rate_limit().unwrap().remaining, 0);
}

#[tokio::test]
async fn test_forbidden_with_quota_left_is_not_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "4000")
                .insert_header("x-ratelimit-reset", "1704067200")
                .set_body_string("Resource not accessible"),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri(), None).unwrap();
    let err = transport.get("/repos/org/private").await.unwrap_err();
    assert!(!err.is_rate_limited());
    assert!(matches!(err, ClientError::Http { status: 403, ref message, .. } if message == "Resource not accessible"));
}

#[tokio::test]
async fn test_invalid_json_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri(), None).unwrap();
    let err = transport.get("/search/issues").await.unwrap_err();
    assert!(matches!(err, ClientError::Parse(_)));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_json(json!({"query": "{ viewer { login } }"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri(), Some("secret")).unwrap();
    let body = transport
        .post("/graphql", &json!({"query": "{ viewer { login } }"}))
        .await
        .unwrap();
    assert_eq!(body, json!({"data": {}}));
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(format!("http://{addr}"), None).unwrap();
    let err = transport.get("/search/issues").await.unwrap_err();
    assert!(matches!(err, ClientError::Connect(_)), "{err:?}");
}
