//! Integration tests for logging and tracing

use repo_data_collector::collector::{CollectionOrchestrator, CollectionRequest};
use repo_data_collector::output::json::JsonBatchWriter;
use repo_data_collector::{CollectionType, RepositoryId};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use super::support::DaySource;

fn init_test_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("repo_data_collector=debug"))
        .with_test_writer()
        .try_init();
}

#[test]
fn test_json_subscriber_builds() {
    let result = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("repo_data_collector=info"))
        .with_test_writer()
        .try_init();

    // another test may have installed the global subscriber first
    assert!(result.is_ok() || result.is_err());
}

#[test]
fn test_filters_parse() {
    for directive in [
        "info",
        "repo_data_collector=debug",
        "warn,repo_data_collector::client=trace",
        "repo_data_collector::collector=debug,repo_data_collector=info",
    ] {
        let _filter = EnvFilter::new(directive);
    }
}

#[test]
fn test_structured_fields_and_levels() {
    init_test_subscriber();

    let repository = "org/repo";
    info!(repository, collection_type = "issues", batch_size = 100, "Starting collection");
    warn!(remaining = 3, "Quota low");
    error!(status = 404, "Request failed");
}

#[tokio::test]
async fn test_collection_runs_inside_spans() {
    init_test_subscriber();

    let dir = tempfile::TempDir::new().unwrap();
    let request =
        CollectionRequest::builder(RepositoryId::parse("org/repo").unwrap(), CollectionType::Issues)
            .created_after("2023-01-01")
            .created_before("2023-01-04")
            .output_dir(dir.path())
            .build()
            .validated();

    let span = tracing::info_span!("test_run", case = "spans");
    let _enter = span.enter();
    let result = CollectionOrchestrator::new(DaySource::uniform(5), JsonBatchWriter::new())
        .collect(&request)
        .await
        .unwrap();
    assert_eq!(result.processed, 15);
}
