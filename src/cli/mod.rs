//! CLI command implementations

pub mod collect;
pub mod error;
pub mod verify;

use crate::client::http::DEFAULT_API_URL;
use crate::collector::config::MAX_RETRIES;
use chrono::{DateTime, NaiveDate};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub use collect::CollectArgs;
pub use error::CliError;
pub use verify::VerifyArgs;

/// Repository data collector CLI
#[derive(Parser, Debug)]
#[command(name = "repo-data-collector")]
#[command(
    about = "Collect issues, pull requests, releases and collaborators into batch files",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Debug-level logging
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// API base URL
    #[arg(long, global = true, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// API token
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Maximum number of retries for failed requests (range: 0-20)
    #[arg(
        long,
        global = true,
        default_value_t = MAX_RETRIES,
        value_parser = clap::value_parser!(u32).range(0..=20)
    )]
    pub max_retries: u32,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Resume state directory (default: .resume)
    #[arg(long, global = true)]
    pub resume_dir: Option<PathBuf>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect items from a repository
    Collect(CollectArgs),

    /// Audit (and optionally repair) an output directory
    Verify(VerifyArgs),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Parse a date from YYYY-MM-DD or an RFC3339 datetime (its UTC date is used)
pub fn parse_date_flexible(input: &str) -> Result<NaiveDate, CliError> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.naive_utc().date());
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid date '{input}': {e}")))
}
