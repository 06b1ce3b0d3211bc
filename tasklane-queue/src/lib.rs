//! Coordinator-free task queue over Redis.
//!
//! Producers enqueue tasks under a topic; any number of workers on any
//! number of hosts claim them. There is no broker process: every
//! coordination decision is an optimistic Redis transaction, so no task is
//! ever held by two workers at once and nothing leaks from pending to
//! working without a recorded owner.
//!
//! Provides:
//! - FIFO claiming with WATCH/MULTI/EXEC and jittered retry on contention
//! - Server-clock heartbeats and progress records per task
//! - Corrupt pending entries skipped, not spun on
//! - Worker runner with concurrency, heartbeating and graceful stop
//! - An in-memory store with the same transaction semantics, for tests
//!
//! ## Keys
//!
//! For topic `T` and task id `TID`:
//!
//! | key | type | contents |
//! |-----|------|----------|
//! | `T:pending` | list | ids awaiting a worker, oldest at the head |
//! | `T:working` | set | ids currently claimed |
//! | `T:listing:TID` | hash | parameters given at creation |
//! | `T:metrics:TID` | hash | `heartbeat`, `last-acquired`, `last-released`, `hostname`, `pid`, plus progress records |
//!
//! ## Producing and Consuming
//!
//! ```
//! use std::sync::Arc;
//! use tasklane_queue::{MemoryStore, TaskParams, TaskQueue};
//!
//! # tokio_test::block_on(async {
//! let queue = TaskQueue::new(Arc::new(MemoryStore::new()), "thumbnails");
//!
//! let mut params = TaskParams::new();
//! params.insert("path".into(), "/img/cat.png".into());
//! let tid = queue.create(params).await?;
//!
//! let task = queue.acquire().await?.expect("one task is pending");
//! assert_eq!(task.tid, tid);
//!
//! let mut progress = TaskParams::new();
//! progress.insert("percent".into(), "50".into());
//! queue.update(&task.tid, progress).await?;
//!
//! queue.release(&task.tid).await?;
//! assert!(queue.working().await?.is_empty());
//! # Ok::<(), tasklane_queue::QueueError>(())
//! # }).unwrap();
//! ```
//!
//! ## Against Redis
//!
//! ```no_run
//! use tasklane_queue::*;
//! use tasklane_redis::RedisConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueueError> {
//!     // REDIS_HOST, REDIS_PORT, REDIS_USERNAME, REDIS_PASSWORD
//!     let queue = TaskQueue::connect(RedisConfig::from_env().build(), "thumbnails").await?;
//!
//!     let mut worker = Worker::new(queue, |ctx| async move {
//!         println!("processing {}", ctx.tid());
//!         Ok(())
//!     });
//!
//!     worker.start().await?;
//!     tokio::signal::ctrl_c().await.ok();
//!     worker.stop().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod identity;
pub mod keys;
pub mod queue;
pub mod recorder;
pub mod retry;
pub mod store;
pub mod task;
pub mod worker;

pub use error::{QueueError, QueueResult};
pub use identity::WorkerIdentity;
pub use keys::TopicKeys;
pub use queue::{DEFAULT_SCAN_BATCH, QueueConfig, TaskQueue};
pub use recorder::{MetricsRecorder, fields};
pub use retry::RetryPolicy;
pub use store::{MemoryStore, Op, RedisStore, StoreSession, TaskStore, Transaction};
pub use task::{AcquiredTask, QueueStats, TaskId, TaskMetrics, TaskParams};
pub use worker::{TaskContext, TaskHandler, Worker, WorkerConfig};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::queue::{QueueConfig, TaskQueue};
    pub use crate::retry::RetryPolicy;
    pub use crate::store::{MemoryStore, RedisStore, TaskStore};
    pub use crate::task::{AcquiredTask, TaskId, TaskMetrics, TaskParams};
    pub use crate::worker::{TaskContext, Worker, WorkerConfig};
}
