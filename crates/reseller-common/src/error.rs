//! Error types for repository access

use thiserror::Error;

/// Repository errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// Required record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend failure
    #[error("storage error: {0}")]
    StorageError(String),
}

/// Repository result type
pub type RepoResult<T> = Result<T, RepositoryError>;
