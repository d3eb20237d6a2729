//! Repository identifier parsing and validation
//!
//! Implements the identifier format used by the provider: OWNER/REPO

use std::fmt;
use std::str::FromStr;

/// Repository identifier using format OWNER/REPO
///
/// Components keep their original case (the provider matches them
/// case-insensitively, but echoes the canonical case back).
///
/// # Examples
///
/// ```
/// use repo_data_collector::repository::RepositoryId;
///
/// let id = RepositoryId::parse("rust-lang/cargo").unwrap();
/// assert_eq!(id.owner(), "rust-lang");
/// assert_eq!(id.name(), "cargo");
/// assert_eq!(id.to_string(), "rust-lang/cargo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryId {
    owner: String,
    name: String,
}

impl RepositoryId {
    /// Parse an `owner/repo` string into a RepositoryId
    ///
    /// # Errors
    ///
    /// Returns an error if the format is invalid or any component is empty
    /// or contains whitespace.
    pub fn parse(s: &str) -> Result<Self, RepositoryError> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        if parts.len() != 2 {
            return Err(RepositoryError::InvalidFormat(format!(
                "invalid repository '{s}': expected OWNER/REPO"
            )));
        }

        let owner = parts[0].trim();
        if owner.is_empty() {
            return Err(RepositoryError::InvalidFormat(
                "owner component cannot be empty".to_string(),
            ));
        }

        let name = parts[1].trim();
        if name.is_empty() {
            return Err(RepositoryError::InvalidFormat(
                "repository name component cannot be empty".to_string(),
            ));
        }

        if owner.contains(char::is_whitespace) || name.contains(char::is_whitespace) {
            return Err(RepositoryError::InvalidFormat(format!(
                "invalid repository '{s}': components cannot contain whitespace"
            )));
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Get the owner (user or organization)
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Get the repository name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Convert identifier to filesystem-safe format
    ///
    /// # Examples
    ///
    /// ```
    /// use repo_data_collector::repository::RepositoryId;
    ///
    /// let id = RepositoryId::parse("Org/My.Repo").unwrap();
    /// assert_eq!(id.to_filesystem_safe(), "org_my.repo");
    /// ```
    pub fn to_filesystem_safe(&self) -> String {
        format!("{}_{}", self.owner.to_lowercase(), self.name.to_lowercase())
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryId {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors that can occur during repository identifier parsing
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Invalid identifier format
    #[error("repository error: {0}")]
    InvalidFormat(String),
}
