//! Unit tests for batch strategies and the pending queue

use repo_data_collector::collector::{
    AdaptiveBatchStrategy, BatchStrategy, FixedBatchStrategy, PendingQueue,
};
use serde_json::{json, Value};

fn pending(items: impl IntoIterator<Item = Value>) -> PendingQueue<Value> {
    let mut queue = PendingQueue::new();
    queue.extend(items);
    queue
}

#[test]
fn test_batches_preserve_provider_order_across_pages() {
    let mut queue = pending((1..=3).map(|n| json!({"number": n})));
    queue.extend((4..=5).map(|n| json!({"number": n})));

    let first = FixedBatchStrategy.create_batch(&mut queue, 4);
    let numbers: Vec<u64> = first.iter().map(|i| i["number"].as_u64().unwrap()).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_peek_does_not_consume() {
    let queue = pending((1..=20).map(|n| json!(n)));
    assert_eq!(queue.peek(10).len(), 10);
    assert_eq!(queue.peek(50).len(), 20);
    assert_eq!(queue.len(), 20);
}

#[test]
fn test_adaptive_keeps_size_for_small_items() {
    let item = json!({"number": 1, "title": "small"});
    let strategy = AdaptiveBatchStrategy::new();
    assert_eq!(strategy.calculate_batch_size(&[&item], 100), 100);
}

#[test]
fn test_adaptive_halves_once_for_large_items() {
    let item = json!({"body": "x".repeat(60_000)});
    let strategy = AdaptiveBatchStrategy::new();
    assert_eq!(strategy.calculate_batch_size(&[&item, &item], 100), 50);
}

#[test]
fn test_adaptive_samples_only_the_front() {
    let small = json!({"n": 1});
    let large = json!({"body": "y".repeat(5_000)});
    let strategy = AdaptiveBatchStrategy::new()
        .with_large_item_bytes(1_000)
        .with_sample_size(2);
    // the large item sits past the sample window
    assert_eq!(strategy.calculate_batch_size(&[&small, &small, &large], 80), 80);
}

#[test]
fn test_adaptive_empty_sample() {
    let strategy = AdaptiveBatchStrategy::new();
    assert_eq!(BatchStrategy::<Value>::calculate_batch_size(&strategy, &[], 100), 100);
}

#[test]
fn test_strategy_names() {
    assert_eq!(BatchStrategy::<Value>::name(&FixedBatchStrategy), "fixed");
    assert_eq!(BatchStrategy::<Value>::name(&AdaptiveBatchStrategy::new()), "adaptive");
}
