//! Error types for the tasklane CLI.

use std::fmt;
use tasklane_queue::QueueError;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Debug)]
pub enum CliError {
    /// Queue or store failure
    Queue(QueueError),

    /// Invalid argument
    InvalidArgument(String),

    /// Requested task has no records
    NotFound(String),

    /// Output serialization error
    Json(serde_json::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Queue(e) => write!(f, "{}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::NotFound(what) => write!(f, "Not found: {}", what),
            CliError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<QueueError> for CliError {
    fn from(e: QueueError) -> Self {
        CliError::Queue(e)
    }
}

impl From<tasklane_redis::RedisError> for CliError {
    fn from(e: tasklane_redis::RedisError) -> Self {
        CliError::Queue(QueueError::Redis(e))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}
