//! Auditing an existing output directory
//!
//! [`VerificationEngine`] reads batch files and reports findings; it never
//! touches the files. [`DeduplicationEngine`] repairs the duplicates it
//! reports. Neither needs API access, and neither may run while a collection
//! is still writing into the same directory.

use crate::output::{self, OutputError};
use crate::{CollectionType, ItemState};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub mod dedup;

pub use dedup::{DeduplicationEngine, DeduplicationResult};

/// Verification errors
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Output directory does not exist
    #[error("output directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// A batch file could not be read or written
    #[error("IO error: {0}")]
    Io(String),

    /// Listing or rewriting batch files failed
    #[error("output error: {0}")]
    Output(#[from] OutputError),
}

/// Structural problem in the output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// File is not valid JSON
    InvalidJson { file: String, error: String },
    /// Item array missing or not an array
    MissingItems { file: String },
    /// Declared `item_count` differs from the array length
    CountMismatch {
        file: String,
        declared: u64,
        actual: usize,
    },
    /// Item without an identifier field
    MissingIdentifier { file: String, position: usize },
    /// Batch numbering is not contiguous from 1
    NumberingGap { expected: usize, found: usize },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson { file, error } => write!(f, "{file}: invalid JSON ({error})"),
            Self::MissingItems { file } => write!(f, "{file}: item array missing"),
            Self::CountMismatch {
                file,
                declared,
                actual,
            } => write!(f, "{file}: metadata declares {declared} items, found {actual}"),
            Self::MissingIdentifier { file, position } => {
                write!(f, "{file}: item {position} has no identifier")
            }
            Self::NumberingGap { expected, found } => {
                write!(f, "batch numbering gap: expected {expected}, found {found}")
            }
        }
    }
}

/// Identifier present in more than one batch file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateItem {
    /// Identifier as a string
    pub id: String,
    /// Files containing the item, in scan order
    pub files: Vec<String>,
}

/// Item created outside the requested range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateViolation {
    /// Batch file name
    pub file: String,
    /// Item identifier
    pub id: String,
    /// Raw `created_at` value
    pub created_at: String,
}

/// Item whose state differs from the requested one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateViolation {
    /// Batch file name
    pub file: String,
    /// Item identifier
    pub id: String,
    /// State the directory was collected with
    pub expected: String,
    /// State found on the item
    pub actual: String,
}

/// Findings of one verification pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    /// Batch files read
    pub files_scanned: usize,
    /// Items read across all files
    pub items_scanned: usize,
    /// Structural problems
    pub integrity_issues: Vec<IntegrityIssue>,
    /// Identifiers seen in more than one file, in first-seen order
    pub duplicates: Vec<DuplicateItem>,
    /// Items outside the expected creation range
    pub date_violations: Vec<DateViolation>,
    /// Items not in the expected state
    pub state_violations: Vec<StateViolation>,
}

impl VerificationResult {
    /// No findings of any kind
    pub fn is_clean(&self) -> bool {
        self.finding_count() == 0
    }

    /// Total number of findings
    pub fn finding_count(&self) -> usize {
        self.integrity_issues.len()
            + self.duplicates.len()
            + self.date_violations.len()
            + self.state_violations.len()
    }
}

/// Identifier of `item` as a comparable string
pub(crate) fn item_key(item: &Value, field: &str) -> Option<String> {
    match item.get(field)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

pub(crate) fn read_batch(path: &Path) -> Result<Value, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&raw).map_err(|e| e.to_string())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read-only batch directory auditor
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationEngine;

impl VerificationEngine {
    /// Create an engine
    pub fn new() -> Self {
        Self
    }

    /// Audit every `collection_type` batch file in `dir`.
    ///
    /// Date checks apply `[created_after, created_before)` to the date part
    /// of `created_at`; state checks are skipped for `all` and for types
    /// without a state.
    pub fn verify(
        &self,
        dir: &Path,
        collection_type: CollectionType,
        expected_state: Option<ItemState>,
        created_after: Option<NaiveDate>,
        created_before: Option<NaiveDate>,
    ) -> Result<VerificationResult, VerifyError> {
        if !dir.is_dir() {
            return Err(VerifyError::DirectoryNotFound(dir.to_path_buf()));
        }

        let files = output::list_batch_files(dir, collection_type)?;
        let id_field = collection_type.id_field();
        let key = collection_type.as_str();
        let check_dates = collection_type.supports_date_filter()
            && (created_after.is_some() || created_before.is_some());
        let state_filter = expected_state
            .filter(|s| *s != ItemState::All && collection_type.supports_state_filter());

        let mut result = VerificationResult::default();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut occurrences: Vec<DuplicateItem> = Vec::new();

        for (_, path) in &files {
            let file = file_name(path);
            result.files_scanned += 1;

            let doc = match read_batch(path) {
                Ok(doc) => doc,
                Err(error) => {
                    warn!(file = %file, error = %error, "Unreadable batch file");
                    result
                        .integrity_issues
                        .push(IntegrityIssue::InvalidJson { file, error });
                    continue;
                }
            };

            let Some(items) = doc.get(key).and_then(Value::as_array) else {
                result
                    .integrity_issues
                    .push(IntegrityIssue::MissingItems { file });
                continue;
            };

            if let Some(declared) = doc
                .get("metadata")
                .and_then(|m| m.get("item_count"))
                .and_then(Value::as_u64)
            {
                if declared != items.len() as u64 {
                    result.integrity_issues.push(IntegrityIssue::CountMismatch {
                        file: file.clone(),
                        declared,
                        actual: items.len(),
                    });
                }
            }

            debug!(file = %file, items = items.len(), "Scanning batch");
            for (position, item) in items.iter().enumerate() {
                result.items_scanned += 1;
                let Some(id) = item_key(item, id_field) else {
                    result
                        .integrity_issues
                        .push(IntegrityIssue::MissingIdentifier {
                            file: file.clone(),
                            position,
                        });
                    continue;
                };

                match seen.get(&id) {
                    Some(&slot) => {
                        let entry = &mut occurrences[slot];
                        if entry.files.last() != Some(&file) {
                            entry.files.push(file.clone());
                        }
                    }
                    None => {
                        seen.insert(id.clone(), occurrences.len());
                        occurrences.push(DuplicateItem {
                            id: id.clone(),
                            files: vec![file.clone()],
                        });
                    }
                }

                if check_dates {
                    if let Some(violation) =
                        date_violation(item, &file, &id, created_after, created_before)
                    {
                        result.date_violations.push(violation);
                    }
                }

                if let Some(expected) = state_filter {
                    if let Some(violation) =
                        state_violation(item, &file, &id, expected, collection_type)
                    {
                        result.state_violations.push(violation);
                    }
                }
            }
        }

        let mut expected = 1;
        for (number, _) in &files {
            if *number != expected {
                result.integrity_issues.push(IntegrityIssue::NumberingGap {
                    expected,
                    found: *number,
                });
                break;
            }
            expected += 1;
        }

        result.duplicates = occurrences
            .into_iter()
            .filter(|d| d.files.len() > 1)
            .collect();

        info!(
            files = result.files_scanned,
            items = result.items_scanned,
            integrity_issues = result.integrity_issues.len(),
            duplicates = result.duplicates.len(),
            date_violations = result.date_violations.len(),
            state_violations = result.state_violations.len(),
            "Verification complete"
        );
        Ok(result)
    }
}

fn date_violation(
    item: &Value,
    file: &str,
    id: &str,
    after: Option<NaiveDate>,
    before: Option<NaiveDate>,
) -> Option<DateViolation> {
    let created_at = item.get("created_at")?.as_str()?;
    let date = NaiveDate::parse_from_str(created_at.get(..10)?, "%Y-%m-%d").ok()?;
    let too_early = after.is_some_and(|a| date < a);
    let too_late = before.is_some_and(|b| date >= b);
    (too_early || too_late).then(|| DateViolation {
        file: file.to_string(),
        id: id.to_string(),
        created_at: created_at.to_string(),
    })
}

fn state_violation(
    item: &Value,
    file: &str,
    id: &str,
    expected: ItemState,
    collection_type: CollectionType,
) -> Option<StateViolation> {
    let (matches, actual) =
        if expected == ItemState::Merged && collection_type == CollectionType::PullRequests {
            let merged = item.get("merged").and_then(Value::as_bool).unwrap_or(false);
            (merged, if merged { "merged" } else { "not merged" }.to_string())
        } else {
            let actual = item
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            (actual.eq_ignore_ascii_case(expected.as_str()), actual)
        };

    (!matches).then(|| StateViolation {
        file: file.to_string(),
        id: id.to_string(),
        expected: expected.as_str().to_string(),
        actual,
    })
}
