//! GitHub adapter implementing [`PageFetcher`] and [`RangeCounter`]
//!
//! Issues and pull requests come from `/search/issues`; releases and
//! collaborators from the repository list endpoints, which do not understand
//! search qualifiers, so the repository and `created:` range are read back out
//! of the query string and applied locally.
//!
//! The cursor is the offset of the next item. Offsets map onto page numbers
//! by choosing a `per_page` that divides the offset, so the final (smaller)
//! page of a run never re-reads items already fetched.

use super::{ClientError, ClientResult, PageFetcher, RangeCounter, SearchResult, Transport};
use crate::collector::config::PROVIDER_RESULT_CAP;
use crate::CollectionType;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const SEARCH_PATH: &str = "/search/issues";

/// Source of one collection type for one transport
pub struct GitHubSource<T> {
    transport: Arc<T>,
    collection_type: CollectionType,
}

impl<T> Clone for GitHubSource<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            collection_type: self.collection_type,
        }
    }
}

impl<T: Transport> GitHubSource<T> {
    /// Create a source for `collection_type`
    pub fn new(transport: Arc<T>, collection_type: CollectionType) -> Self {
        Self {
            transport,
            collection_type,
        }
    }

    /// Collection type served by this source
    pub fn collection_type(&self) -> CollectionType {
        self.collection_type
    }

    async fn fetch_search(
        &self,
        query: &str,
        offset: u64,
        per_page: u64,
    ) -> ClientResult<(Vec<Value>, Option<u64>)> {
        let page = offset / per_page + 1;
        let params = [
            ("q", query.to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];
        let body = self.transport.get_with_query(SEARCH_PATH, &params).await?;

        if body.get("incomplete_results").and_then(Value::as_bool) == Some(true) {
            warn!(query, page, "Search returned incomplete results");
        }

        let total = body.get("total_count").and_then(Value::as_u64);
        let items = take_array(body, "items")?;
        Ok((items, total))
    }

    async fn fetch_list(
        &self,
        query: &str,
        offset: u64,
        per_page: u64,
    ) -> ClientResult<Vec<Value>> {
        let repository = repo_qualifier(query).ok_or_else(|| {
            ClientError::Parse(format!("query '{query}' has no repo: qualifier"))
        })?;
        let path = format!("/repos/{repository}/{}", self.collection_type.as_str());
        let page = offset / per_page + 1;
        let params = [
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];

        match self.transport.get_with_query(&path, &params).await? {
            Value::Array(items) => Ok(items),
            other => Err(ClientError::Parse(format!(
                "expected array from {path}, got {}",
                type_name(&other)
            ))),
        }
    }
}

#[async_trait]
impl<T: Transport> PageFetcher for GitHubSource<T> {
    type Item = Value;

    async fn fetch_page(
        &self,
        query: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> ClientResult<SearchResult<Value>> {
        let offset = match cursor {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ClientError::Parse(format!("invalid cursor '{raw}'")))?,
            None => 0,
        };
        let per_page = aligned_page_size(offset, page_size.max(1) as u64);

        debug!(
            collection_type = %self.collection_type,
            offset,
            per_page,
            "Fetching page"
        );

        let (raw, total) = if self.collection_type.is_searchable() {
            self.fetch_search(query, offset, per_page).await?
        } else {
            (self.fetch_list(query, offset, per_page).await?, None)
        };

        let fetched = raw.len() as u64;
        let next_offset = offset + fetched;
        let reachable = total.map(|t| t.min(PROVIDER_RESULT_CAP));
        let has_more =
            fetched == per_page && fetched > 0 && reachable.map_or(true, |r| next_offset < r);

        let items = match self.collection_type {
            CollectionType::PullRequests => raw.into_iter().map(with_merged_flag).collect(),
            CollectionType::Releases => {
                let range = created_range(query);
                raw.into_iter()
                    .filter(|item| within_range(item, range))
                    .collect()
            }
            _ => raw,
        };

        Ok(SearchResult {
            items,
            next_cursor: has_more.then(|| next_offset.to_string()),
            has_more,
            total_count: total,
        })
    }
}

#[async_trait]
impl<T: Transport> RangeCounter for GitHubSource<T> {
    async fn count(&self, query: &str) -> ClientResult<u64> {
        if !self.collection_type.is_searchable() {
            return Err(ClientError::Parse(format!(
                "{} cannot be counted by query",
                self.collection_type
            )));
        }

        let params = [("q", query.to_string()), ("per_page", "1".to_string())];
        let body = self.transport.get_with_query(SEARCH_PATH, &params).await?;
        body.get("total_count")
            .and_then(Value::as_u64)
            .ok_or_else(|| ClientError::Parse("search response missing total_count".to_string()))
    }
}

/// Largest page size not above `requested` whose page boundaries include `offset`
fn aligned_page_size(offset: u64, requested: u64) -> u64 {
    if offset == 0 || offset % requested == 0 {
        requested
    } else {
        gcd(offset, requested)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn take_array(mut body: Value, key: &str) -> ClientResult<Vec<Value>> {
    match body.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(ClientError::Parse(format!("response missing '{key}' array"))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Search results for pull requests only carry `pull_request.merged_at`
fn with_merged_flag(mut item: Value) -> Value {
    if let Value::Object(map) = &mut item {
        if !map.contains_key("merged") {
            let merged = map
                .get("pull_request")
                .and_then(|pr| pr.get("merged_at"))
                .map(|at| !at.is_null())
                .unwrap_or(false);
            map.insert("merged".to_string(), Value::Bool(merged));
        }
    }
    item
}

fn repo_qualifier(query: &str) -> Option<&str> {
    query
        .split_whitespace()
        .find_map(|token| token.strip_prefix("repo:"))
}

/// `[after, before)` from a `created:` qualifier rendered by the request
fn created_range(query: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let Some(raw) = query
        .split_whitespace()
        .find_map(|token| token.strip_prefix("created:"))
    else {
        return (None, None);
    };

    let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
    if let Some((after, last)) = raw.split_once("..") {
        (parse(after), parse(last).and_then(|d| d.succ_opt()))
    } else if let Some(after) = raw.strip_prefix(">=") {
        (parse(after), None)
    } else if let Some(before) = raw.strip_prefix('<') {
        (None, parse(before))
    } else {
        (None, None)
    }
}

fn within_range(item: &Value, range: (Option<NaiveDate>, Option<NaiveDate>)) -> bool {
    if range == (None, None) {
        return true;
    }
    let Some(created) = item
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| s.get(..10))
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    else {
        return true;
    };
    range.0.map_or(true, |after| created >= after) && range.1.map_or(true, |before| created < before)
}
