//! Error types for queue operations.

use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
///
/// Contention between workers is not an error: conflicting transactions are
/// retried inside the operation. [`QueueError::ContentionExhausted`] only
/// appears when the retry policy carries an attempt limit.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The store could not be reached or rejected a command.
    #[error("Redis error: {0}")]
    Redis(#[from] tasklane_redis::RedisError),

    /// A store implementation failed for a reason of its own.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Every permitted attempt lost its optimistic transaction.
    #[error("Gave up on {operation} after {attempts} conflicting attempts")]
    ContentionExhausted {
        operation: &'static str,
        attempts: u32,
    },

    /// A worker handler reported failure.
    #[error("Task handler failed: {0}")]
    Handler(String),

    #[error("Worker not running")]
    WorkerNotRunning,

    #[error("Worker already running")]
    WorkerAlreadyRunning,
}

impl QueueError {
    /// Convenience constructor for handler failures.
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::Redis(tasklane_redis::RedisError::Redis(err))
    }
}
