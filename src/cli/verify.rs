//! Verify command implementation

use super::{parse_date_flexible, Cli, CliError, OutputFormat};
use crate::verify::{DeduplicationEngine, DeduplicationResult, VerificationEngine, VerificationResult};
use crate::{CollectionType, ItemState};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

/// Verify command arguments
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Output directory to audit
    #[arg(long)]
    pub dir: PathBuf,

    /// Collection type of the batch files
    #[arg(long = "type", default_value = "issues")]
    pub collection_type: CollectionType,

    /// Expected item state (open, closed, merged, all)
    #[arg(long)]
    pub state: Option<ItemState>,

    /// Inclusive lower creation date (YYYY-MM-DD)
    #[arg(long)]
    pub created_after: Option<String>,

    /// Exclusive upper creation date (YYYY-MM-DD)
    #[arg(long)]
    pub created_before: Option<String>,

    /// Remove duplicates (keep first) and renumber, then verify again
    #[arg(long, default_value_t = false)]
    pub fix: bool,
}

impl VerifyArgs {
    /// Execute the verification; fails when findings remain
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let after = self
            .created_after
            .as_deref()
            .map(parse_date_flexible)
            .transpose()?;
        let before = self
            .created_before
            .as_deref()
            .map(parse_date_flexible)
            .transpose()?;

        let engine = VerificationEngine::new();
        let run = || engine.verify(&self.dir, self.collection_type, self.state, after, before);

        let mut report = run()?;
        let mut repair = None;

        if self.fix && !report.duplicates.is_empty() {
            info!(duplicates = report.duplicates.len(), "Removing duplicates");
            let fixed = DeduplicationEngine::new().deduplicate(
                &self.dir,
                self.collection_type,
                &report.duplicates,
            )?;
            repair = Some(fixed);
            report = run()?;
        }

        match cli.output_format {
            OutputFormat::Json => output_json(&report, repair.as_ref()),
            OutputFormat::Human => output_human(&self.dir, &report, repair.as_ref()),
        }

        if report.is_clean() {
            Ok(())
        } else {
            warn!(findings = report.finding_count(), "Verification found problems");
            Err(CliError::FindingsRemain(report.finding_count()))
        }
    }
}

fn output_json(report: &VerificationResult, repair: Option<&DeduplicationResult>) {
    let output = serde_json::json!({
        "clean": report.is_clean(),
        "verification": report,
        "deduplication": repair,
    });
    println!("{output}");
}

fn output_human(
    dir: &std::path::Path,
    report: &VerificationResult,
    repair: Option<&DeduplicationResult>,
) {
    println!("\nVerified {}", dir.display());
    println!("Files scanned: {}", report.files_scanned);
    println!("Items scanned: {}", report.items_scanned);

    if let Some(repair) = repair {
        println!(
            "Removed {} duplicate(s): {} file(s) rewritten, {} deleted, {} renumbered",
            repair.duplicates_removed,
            repair.files_rewritten,
            repair.files_deleted,
            repair.files_renumbered
        );
    }

    for issue in &report.integrity_issues {
        println!("  [INTEGRITY] {issue}");
    }
    for duplicate in &report.duplicates {
        println!("  [DUPLICATE] {} in {}", duplicate.id, duplicate.files.join(", "));
    }
    for violation in &report.date_violations {
        println!(
            "  [DATE] {} in {} created {}",
            violation.id, violation.file, violation.created_at
        );
    }
    for violation in &report.state_violations {
        println!(
            "  [STATE] {} in {} is '{}', expected '{}'",
            violation.id, violation.file, violation.actual, violation.expected
        );
    }

    if report.is_clean() {
        println!("No problems found");
    } else {
        println!("{} problem(s) found", report.finding_count());
    }
}
