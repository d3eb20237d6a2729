//! Integration tests for duplicate removal and renumbering

use repo_data_collector::output::{self, json::JsonBatchWriter, BatchMetadata, BatchPersister};
use repo_data_collector::verify::{DeduplicationEngine, VerificationEngine};
use repo_data_collector::CollectionType;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, index: usize, numbers: &[u64]) {
    let items: Vec<Value> = numbers
        .iter()
        .map(|n| json!({"number": n, "title": format!("issue {n}")}))
        .collect();
    let metadata = BatchMetadata {
        batch_index: index,
        item_count: items.len(),
        collection_type: "issues".to_string(),
        repository: "org/repo".to_string(),
        state: "all".to_string(),
        timestamp: "2024-01-01T00:00:00Z".to_string(),
        label_filters: None,
        label_mode: None,
    };
    JsonBatchWriter::new().persist(dir, &metadata, &items).unwrap();
}

fn read(dir: &Path, index: usize) -> Value {
    let path = dir.join(output::batch_filename(index, CollectionType::Issues));
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn numbers(doc: &Value) -> Vec<u64> {
    doc["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["number"].as_u64().unwrap())
        .collect()
}

fn verify_then_dedup(dir: &Path) -> repo_data_collector::verify::DeduplicationResult {
    let report = VerificationEngine::new()
        .verify(dir, CollectionType::Issues, None, None, None)
        .unwrap();
    DeduplicationEngine::new()
        .deduplicate(dir, CollectionType::Issues, &report.duplicates)
        .unwrap()
}

#[test]
fn test_first_occurrence_kept() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), 1, &[40, 41, 42]);
    write(dir.path(), 2, &[42, 43]);

    let result = verify_then_dedup(dir.path());
    assert_eq!(result.duplicates_removed, 1);
    assert_eq!(result.files_rewritten, 1);

    assert_eq!(numbers(&read(dir.path(), 1)), vec![40, 41, 42]);
    let second = read(dir.path(), 2);
    assert_eq!(numbers(&second), vec![43]);
    assert_eq!(second["metadata"]["item_count"], json!(1));
    // untouched metadata survives the rewrite
    assert_eq!(second["metadata"]["repository"], json!("org/repo"));
}

#[test]
fn test_emptied_batch_removed_and_rest_renumbered() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), 1, &[1, 2, 3]);
    write(dir.path(), 2, &[2, 3]);
    write(dir.path(), 3, &[4, 5]);

    let result = verify_then_dedup(dir.path());
    assert_eq!(result.duplicates_removed, 2);
    assert_eq!(result.files_deleted, 1);
    assert_eq!(result.files_renumbered, 1);

    let remaining: Vec<usize> = output::list_batch_files(dir.path(), CollectionType::Issues)
        .unwrap()
        .into_iter()
        .map(|(n, _)| n)
        .collect();
    assert_eq!(remaining, vec![1, 2]);

    let second = read(dir.path(), 2);
    assert_eq!(numbers(&second), vec![4, 5]);
    assert_eq!(second["metadata"]["batch_index"], json!(2));

    let after = VerificationEngine::new()
        .verify(dir.path(), CollectionType::Issues, None, None, None)
        .unwrap();
    assert!(after.is_clean(), "{after:?}");
}

#[test]
fn test_duplicate_across_three_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), 1, &[7, 8]);
    write(dir.path(), 2, &[7, 9]);
    write(dir.path(), 3, &[7, 10]);

    let result = verify_then_dedup(dir.path());
    assert_eq!(result.duplicates_removed, 2);
    assert_eq!(result.files_rewritten, 2);
    assert_eq!(numbers(&read(dir.path(), 1)), vec![7, 8]);
    assert_eq!(numbers(&read(dir.path(), 2)), vec![9]);
    assert_eq!(numbers(&read(dir.path(), 3)), vec![10]);
}
