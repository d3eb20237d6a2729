//! Batch sizing strategies and the pending-item queue

use super::config::{LARGE_ITEM_BYTES, SAMPLE_SIZE};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Fetched items waiting to be batched, in fetch order
#[derive(Debug, Clone)]
pub struct PendingQueue<T> {
    items: VecDeque<T>,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> PendingQueue<T> {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fetched page at the back
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) {
        self.items.extend(items);
    }

    /// Remove up to `n` items from the front
    pub fn take_front(&mut self, n: usize) -> Vec<T> {
        let n = n.min(self.items.len());
        self.items.drain(..n).collect()
    }

    /// Items at the front, without removing them
    pub fn peek(&self, n: usize) -> Vec<&T> {
        self.items.iter().take(n).collect()
    }

    /// Number of pending items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no items are pending
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Policy for carving batches off the pending queue
pub trait BatchStrategy<T>: Send + Sync {
    /// Remove and return up to `max_batch_size` items from the front of
    /// `pending`, preserving order
    fn create_batch(&self, pending: &mut PendingQueue<T>, max_batch_size: usize) -> Vec<T> {
        pending.take_front(max_batch_size)
    }

    /// Recommended batch size given a sample of items
    fn calculate_batch_size(&self, sample: &[&T], requested: usize) -> usize;

    /// Items to hand to [`calculate_batch_size`](Self::calculate_batch_size)
    fn sample_size(&self) -> usize {
        SAMPLE_SIZE
    }

    /// Name for logs
    fn name(&self) -> &'static str;
}

/// Batches of exactly the requested size
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedBatchStrategy;

impl<T> BatchStrategy<T> for FixedBatchStrategy {
    fn calculate_batch_size(&self, _sample: &[&T], requested: usize) -> usize {
        requested
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Halves the batch size when sampled items are large
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveBatchStrategy {
    large_item_bytes: usize,
    sample_size: usize,
}

impl Default for AdaptiveBatchStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveBatchStrategy {
    /// Strategy with the default thresholds
    pub fn new() -> Self {
        Self {
            large_item_bytes: LARGE_ITEM_BYTES,
            sample_size: SAMPLE_SIZE,
        }
    }

    /// Override the average-size threshold in bytes
    pub fn with_large_item_bytes(mut self, bytes: usize) -> Self {
        self.large_item_bytes = bytes;
        self
    }

    /// Override how many items are sampled
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size.max(1);
        self
    }

    /// Items to sample
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}

impl<T: Serialize> BatchStrategy<T> for AdaptiveBatchStrategy {
    fn calculate_batch_size(&self, sample: &[&T], requested: usize) -> usize {
        let sample = &sample[..sample.len().min(self.sample_size)];
        if sample.is_empty() {
            return requested;
        }

        let total: usize = sample
            .iter()
            .map(|item| serde_json::to_vec(item).map(|b| b.len()).unwrap_or(0))
            .sum();
        let average = total / sample.len();

        if average > self.large_item_bytes {
            let adjusted = (requested / 2).max(1);
            info!(
                average_bytes = average,
                threshold = self.large_item_bytes,
                requested,
                adjusted,
                "Large items detected, reducing batch size"
            );
            adjusted
        } else {
            debug!(average_bytes = average, "Batch size unchanged");
            requested
        }
    }

    fn sample_size(&self) -> usize {
        self.sample_size
    }

    fn name(&self) -> &'static str {
        "adaptive"
    }
}
