//! Unit tests for provider query construction

use chrono::NaiveDate;
use repo_data_collector::collector::{CollectionRequest, TimeWindow};
use repo_data_collector::{CollectionType, RepositoryId};

fn builder(ty: CollectionType) -> repo_data_collector::collector::CollectionRequestBuilder {
    CollectionRequest::builder(RepositoryId::parse("rust-lang/rust").unwrap(), ty)
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn test_issue_query_with_state_and_range() {
    let request = builder(CollectionType::Issues)
        .state("open")
        .created_after("2023-01-01")
        .created_before("2023-02-01")
        .build()
        .validated();
    assert_eq!(
        request.search_query(),
        "repo:rust-lang/rust is:issue is:open created:2023-01-01..2023-01-31 sort:created-desc"
    );
}

#[test]
fn test_window_query_uses_inclusive_last_day() {
    let request = builder(CollectionType::PullRequests).build().validated();
    let window = TimeWindow::new(date("2024-02-28"), date("2024-03-01"));
    let query = request.for_window(&window, false, 0).search_query();
    // leap year: the last included day is the 29th
    assert!(query.contains("created:2024-02-28..2024-02-29"), "{query}");
}

#[test]
fn test_labels_with_spaces_are_quoted() {
    let request = builder(CollectionType::Issues)
        .labels(["good first issue", "  ", "A-diagnostics"])
        .label_mode("all")
        .build()
        .validated();
    assert_eq!(request.labels.len(), 2);
    let query = request.search_query();
    assert!(query.contains("label:\"good first issue\""));
    assert!(query.contains("label:\"A-diagnostics\""));
}

#[test]
fn test_releases_query_has_no_search_qualifiers() {
    let request = builder(CollectionType::Releases)
        .state("closed")
        .labels(["bug"])
        .build()
        .validated();
    let query = request.search_query();
    assert!(query.starts_with("repo:rust-lang/rust"));
    assert!(!query.contains("is:"));
    assert!(!query.contains("sort:"));
    assert!(!query.contains("label:"));
}

#[test]
fn test_release_dates_survive_for_local_filtering() {
    let request = builder(CollectionType::Releases)
        .created_after("2023-01-01")
        .created_before("2023-07-01")
        .build()
        .validated();
    assert!(request.search_query().contains("created:2023-01-01..2023-06-30"));
}

#[test]
fn test_page_size_follows_batch_size() {
    let small = builder(CollectionType::Issues).batch_size(30).build().validated();
    assert_eq!(small.page_size(), 30);
    let large = builder(CollectionType::Issues).batch_size(250).build().validated();
    assert_eq!(large.page_size(), 100);
}
