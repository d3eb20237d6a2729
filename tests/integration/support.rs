//! In-memory provider shared by the collection tests
//!
//! Items are spread over days at a configurable density. Counts and pages are
//! derived from the `created:` qualifier of the query, the way the search
//! endpoint would answer them.

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use repo_data_collector::client::{ClientError, ClientResult, PageFetcher, RangeCounter, SearchResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct DaySource {
    density: Arc<dyn Fn(NaiveDate) -> u64 + Send + Sync>,
    fetches: Arc<AtomicUsize>,
    counts: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<String>>>,
    fail_on_fetch: Arc<Mutex<Option<usize>>>,
}

impl DaySource {
    pub fn uniform(per_day: u64) -> Self {
        Self::with_density(move |_| per_day)
    }

    pub fn with_density(density: impl Fn(NaiveDate) -> u64 + Send + Sync + 'static) -> Self {
        Self {
            density: Arc::new(density),
            fetches: Arc::new(AtomicUsize::new(0)),
            counts: Arc::new(AtomicUsize::new(0)),
            queries: Arc::new(Mutex::new(Vec::new())),
            fail_on_fetch: Arc::new(Mutex::new(None)),
        }
    }

    /// Make the `n`th fetch from now fail with a fatal 404
    pub fn fail_on_fetch(&self, n: usize) {
        let current = self.fetches.load(Ordering::SeqCst);
        *self.fail_on_fetch.lock().unwrap() = Some(current + n);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }

    pub fn fetched_queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Items created in `[after, before)`, in provider order
    pub fn items(&self, after: NaiveDate, before: NaiveDate) -> Vec<Value> {
        let mut items = Vec::new();
        for day in after.iter_days().take_while(|d| *d < before) {
            for k in 0..(self.density)(day) {
                items.push(json!({
                    "number": day.num_days_from_ce() as u64 * 100_000 + k,
                    "state": "open",
                    "created_at": format!("{day}T12:00:00Z"),
                }));
            }
        }
        items
    }

    pub fn total(&self, after: NaiveDate, before: NaiveDate) -> u64 {
        after
            .iter_days()
            .take_while(|d| *d < before)
            .map(|d| (self.density)(d))
            .sum()
    }
}

/// `[after, before)` from a `created:A..B` qualifier (B inclusive)
pub fn created_range(query: &str) -> Option<(NaiveDate, NaiveDate)> {
    let qualifier = query.split(' ').find_map(|t| t.strip_prefix("created:"))?;
    let (a, b) = qualifier.split_once("..")?;
    let after = NaiveDate::parse_from_str(a, "%Y-%m-%d").ok()?;
    let last = NaiveDate::parse_from_str(b, "%Y-%m-%d").ok()?;
    Some((after, last + Duration::days(1)))
}

#[async_trait]
impl RangeCounter for DaySource {
    async fn count(&self, query: &str) -> ClientResult<u64> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        let (after, before) = created_range(query)
            .ok_or_else(|| ClientError::Parse(format!("no created range in '{query}'")))?;
        Ok(self.total(after, before))
    }
}

#[async_trait]
impl PageFetcher for DaySource {
    type Item = Value;

    async fn fetch_page(
        &self,
        query: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> ClientResult<SearchResult<Value>> {
        let call = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        self.queries.lock().unwrap().push(query.to_string());
        if *self.fail_on_fetch.lock().unwrap() == Some(call) {
            return Err(ClientError::Http {
                status: 404,
                message: "Not Found".into(),
                rate_limit: None,
            });
        }

        let (after, before) = created_range(query)
            .ok_or_else(|| ClientError::Parse(format!("no created range in '{query}'")))?;
        let all = self.items(after, before);
        let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (start + page_size).min(all.len());
        let has_more = end < all.len();

        Ok(SearchResult {
            items: all[start.min(end)..end].to_vec(),
            next_cursor: has_more.then(|| end.to_string()),
            has_more,
            total_count: Some(all.len() as u64),
        })
    }
}
