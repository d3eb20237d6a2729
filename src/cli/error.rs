//! CLI error types and conversions

use crate::client::ClientError;
use crate::collector::CollectError;
use crate::metrics::MetricsError;
use crate::output::OutputError;
use crate::repository::RepositoryError;
use crate::verify::VerifyError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Repository argument is malformed
    #[error("repository error: {0}")]
    RepositoryError(#[from] RepositoryError),

    /// HTTP client could not be built
    #[error("client error: {0}")]
    ClientError(#[from] ClientError),

    /// Collection failed
    #[error("collection error: {0}")]
    CollectError(#[from] CollectError),

    /// Verification or repair failed
    #[error("verification error: {0}")]
    VerifyError(#[from] VerifyError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Metrics exporter could not be installed
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Verification left findings unresolved
    #[error("{0} unresolved finding(s)")]
    FindingsRemain(usize),
}
