//! Collect command implementation

use super::{parse_date_flexible, Cli, CliError, OutputFormat};
use crate::client::http::HttpTransport;
use crate::client::retry::RateLimitAwareClient;
use crate::client::search::GitHubSource;
use crate::collector::config::{DEFAULT_BATCH_SIZE, MAX_PER_WINDOW};
use crate::collector::{
    AdaptiveBatchStrategy, CollectError, CollectionOrchestrator, CollectionRequest,
    CollectionResult, WindowPlanner, WindowedCollector,
};
use crate::output::archive::{create_archive, ArchiveOutput};
use crate::output::json::JsonBatchWriter;
use crate::repository::RepositoryId;
use crate::shutdown::SharedShutdown;
use crate::CollectionType;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Collect command arguments
#[derive(Parser, Debug)]
pub struct CollectArgs {
    /// Repository as owner/repo
    #[arg(long)]
    pub repo: String,

    /// Collection type (issues, pull_requests, releases, collaborators)
    #[arg(long = "type", default_value = "issues")]
    pub collection_type: CollectionType,

    /// State filter (open, closed, merged, all)
    #[arg(long, default_value = "all")]
    pub state: String,

    /// Label filter; repeat for several labels
    #[arg(long = "label")]
    pub labels: Vec<String>,

    /// How several labels combine (any or all)
    #[arg(long, default_value = "any")]
    pub label_mode: String,

    /// Items per batch file
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Stop after this many items
    #[arg(long)]
    pub max_items: Option<u64>,

    /// Sort field (created, updated, comments)
    #[arg(long, default_value = "created")]
    pub sort: String,

    /// Sort direction (asc or desc)
    #[arg(long, default_value = "desc")]
    pub direction: String,

    /// Inclusive lower creation date (YYYY-MM-DD)
    #[arg(long)]
    pub created_after: Option<String>,

    /// Exclusive upper creation date (YYYY-MM-DD)
    #[arg(long)]
    pub created_before: Option<String>,

    /// Directory receiving batch files
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Fetch and batch without writing
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Delete existing batch files of this type first
    #[arg(long, default_value_t = false)]
    pub clean: bool,

    /// Bundle the batch files into a zip archive
    #[arg(long, default_value_t = false)]
    pub zip: bool,

    /// Resume from checkpoints if available
    #[arg(long, default_value_t = false)]
    pub resume: bool,

    /// Halve the batch size when items are large
    #[arg(long, default_value_t = false)]
    pub adaptive: bool,

    /// Largest result count a single date window may hold
    #[arg(long, default_value_t = MAX_PER_WINDOW)]
    pub max_per_window: u64,
}

impl CollectArgs {
    /// Build the validated request from the arguments
    pub fn to_request(&self, verbose: bool) -> Result<CollectionRequest, CliError> {
        let repository = RepositoryId::parse(&self.repo)?;
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

        if let (Some(a), Some(b)) = (after, before) {
            if a >= b {
                return Err(CliError::InvalidArgument(format!(
                    "--created-after ({a}) must be earlier than --created-before ({b})"
                )));
            }
        }

        Ok(CollectionRequest::builder(repository, self.collection_type)
            .state(&self.state)
            .labels(self.labels.iter().cloned())
            .label_mode(&self.label_mode)
            .batch_size(self.batch_size)
            .max_items(self.max_items)
            .sort(&self.sort)
            .direction(&self.direction)
            .date_range(after, before)
            .dry_run(self.dry_run)
            .clean(self.clean)
            .zip(self.zip)
            .verbose(verbose)
            .output_dir(&self.output_dir)
            .build()
            .validated())
    }

    /// Execute the collection
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let request = self.to_request(cli.verbose)?;

        let transport = HttpTransport::new(&cli.api_url, cli.token.as_deref())?;
        let client = Arc::new(
            RateLimitAwareClient::new(transport)
                .with_max_retries(cli.max_retries)
                .with_shutdown(shutdown.clone()),
        );
        let source = GitHubSource::new(client, request.collection_type);

        let progress = create_progress_bar(&request);
        let mut orchestrator = CollectionOrchestrator::new(source.clone(), JsonBatchWriter::new())
            .with_shutdown(shutdown)
            .with_progress(progress.clone());
        if self.adaptive {
            orchestrator = orchestrator.with_strategy(AdaptiveBatchStrategy::new());
        }
        if self.resume {
            let resume_dir = cli
                .resume_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".resume"));
            orchestrator = orchestrator.with_resume(resume_dir);
        }

        let collector = WindowedCollector::new(orchestrator, source)
            .with_planner(WindowPlanner::new().with_max_per_window(self.max_per_window));

        info!(
            repository = %request.repository,
            collection_type = %request.collection_type,
            query = %request.search_query(),
            "Starting collection"
        );

        let result = collector.collect(&request).await;
        progress.finish_and_clear();

        let archive = match &result {
            Ok(done) if request.zip && !request.dry_run && !done.batch_files.is_empty() => {
                let name = format!(
                    "{}_{}",
                    request.repository.to_filesystem_safe(),
                    request.collection_type
                );
                Some(create_archive(&done.output_dir, &done.batch_files, &name)?)
            }
            _ => None,
        };

        match cli.output_format {
            OutputFormat::Json => output_json(&request, &result, archive.as_ref()),
            OutputFormat::Human => output_human(&request, &result, archive.as_ref()),
        }

        result.map(|_| ()).map_err(CliError::from)
    }
}

fn output_json(
    request: &CollectionRequest,
    result: &Result<CollectionResult, CollectError>,
    archive: Option<&ArchiveOutput>,
) {
    let (summary, err) = match result {
        Ok(done) => (serde_json::to_value(done).ok(), None),
        Err(e) => (None, Some(e.to_string())),
    };

    let output = serde_json::json!({
        "success": result.is_ok(),
        "repository": request.repository.to_string(),
        "collection_type": request.collection_type.as_str(),
        "query": request.search_query(),
        "dry_run": request.dry_run,
        "result": summary,
        "archive": archive.map(|a| a.archive_path.display().to_string()),
        "sha256": archive.map(|a| a.sha256.clone()),
        "error": err,
    });

    println!("{output}");
}

fn output_human(
    request: &CollectionRequest,
    result: &Result<CollectionResult, CollectError>,
    archive: Option<&ArchiveOutput>,
) {
    match result {
        Ok(done) => {
            println!("\nCollection completed successfully!");
            println!("Repository: {} ({})", request.repository, request.collection_type);
            println!("Output: {}", done.output_dir.display());
            println!("Available: {}", done.total_available);
            println!("Processed: {}", done.processed);
            println!("Batch files: {}", done.batch_files.len());
            if done.windows > 1 {
                println!("Windows: {}", done.windows);
            }
            if done.resumed {
                println!("Resumed from checkpoint");
            }
            if request.dry_run {
                println!("Dry run: no files were written");
            }
            if let Some(archive) = archive {
                println!("Archive: {} (sha256 {})", archive.archive_path.display(), archive.sha256);
            }
        }
        Err(e) => {
            eprintln!("\nCollection failed!");
            eprintln!("Error: {e}");
            error!("Collection failed: {}", e);
        }
    }
}

/// Progress bar whose length grows as provider totals arrive
fn create_progress_bar(request: &CollectionRequest) -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!(
        "Collecting {} {}",
        request.repository, request.collection_type
    ));
    pb
}
