//! Error taxonomy shared by the sync pipeline, the stores and the catalog.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for trailstamp operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Provider answered with a failure status, or the request never got an answer.
    #[error("AccessLink {operation} failed{}: {message}", status_suffix(.status))]
    Remote {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// Safety valve: the provider kept handing out windows past the retry ceiling.
    #[error("transaction retry limit of {limit} reached; provider may not be registering commits")]
    RetryLimitExceeded { limit: u32 },

    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Protocol misuse, e.g. listing a transaction that was never opened.
    #[error("invalid transaction state: {0}")]
    InvalidState(&'static str),

    #[error("failed to decode provider payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to parse GPS trace: {0}")]
    Trace(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

impl Error {
    /// True for the retry-ceiling termination, which is not a normal end of data.
    pub fn is_retry_limit(&self) -> bool {
        matches!(self, Error::RetryLimitExceeded { .. })
    }
}
