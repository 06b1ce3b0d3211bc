//! Topic-scoped task queue.
//!
//! All coordination happens in the store. Workers never talk to each other:
//! they race to claim the oldest pending task inside an optimistic
//! transaction, and the loser of a race retries against the new state.

use std::sync::Arc;
use tasklane_log::{debug, error, info, warn};
use tasklane_redis::RedisConfig;

use crate::error::{QueueError, QueueResult};
use crate::identity::WorkerIdentity;
use crate::keys::TopicKeys;
use crate::recorder::MetricsRecorder;
use crate::retry::RetryPolicy;
use crate::store::{RedisStore, StoreSession, TaskStore, Transaction};
use crate::task::{AcquiredTask, QueueStats, TaskId, TaskMetrics, TaskParams};

/// Default number of pending entries read per round while looking for a
/// claimable task.
pub const DEFAULT_SCAN_BATCH: usize = 16;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Namespace for every key this queue touches.
    pub topic: String,

    /// Pacing of retries after a lost transaction.
    pub retry: RetryPolicy,

    /// Pending entries read per round while skipping corrupt entries.
    pub scan_batch: usize,

    /// Hostname and pid written on acquire. Defaults to this process.
    pub identity: Option<WorkerIdentity>,
}

impl QueueConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            retry: RetryPolicy::default(),
            scan_batch: DEFAULT_SCAN_BATCH,
            identity: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_scan_batch(mut self, batch: usize) -> Self {
        self.scan_batch = batch.max(1);
        self
    }

    pub fn with_identity(mut self, identity: WorkerIdentity) -> Self {
        self.identity = Some(identity);
        self
    }
}

/// Handle on one topic's queue.
///
/// Cheap to clone; clones share the store. Handles for different topics can
/// share one store as well.
#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    keys: TopicKeys,
    retry: RetryPolicy,
    scan_batch: usize,
    recorder: MetricsRecorder,
}

impl TaskQueue {
    /// Queue for `topic` with default settings.
    pub fn new(store: Arc<dyn TaskStore>, topic: impl Into<String>) -> Self {
        Self::with_config(store, QueueConfig::new(topic))
    }

    pub fn with_config(store: Arc<dyn TaskStore>, config: QueueConfig) -> Self {
        let identity = config.identity.unwrap_or_else(WorkerIdentity::current);
        Self {
            store,
            keys: TopicKeys::new(config.topic),
            retry: config.retry,
            scan_batch: config.scan_batch.max(1),
            recorder: MetricsRecorder::new(identity),
        }
    }

    /// Connect to Redis and bind to `topic`.
    ///
    /// Fails if the server does not answer.
    pub async fn connect(redis: RedisConfig, topic: impl Into<String>) -> QueueResult<Self> {
        let store = RedisStore::connect(redis).await?;
        Ok(Self::new(Arc::new(store), topic))
    }

    pub fn topic(&self) -> &str {
        self.keys.topic()
    }

    pub fn keys(&self) -> &TopicKeys {
        &self.keys
    }

    pub fn identity(&self) -> &WorkerIdentity {
        self.recorder.identity()
    }

    /// Enqueue a new task and return its id.
    ///
    /// The listing and the pending entry are written in one transaction, so
    /// an id never appears in the pending list without its parameters.
    pub async fn create(&self, params: TaskParams) -> QueueResult<TaskId> {
        if params.is_empty() {
            return Err(QueueError::InvalidArgument(
                "a task needs at least one parameter".into(),
            ));
        }

        let tid = TaskId::generate();
        let mut tx = Transaction::new();
        tx.hash_set(self.keys.listing(&tid), params)
            .list_push(self.keys.pending(), tid.as_str());

        let mut session = self.store.session().await?;
        commit_unwatched(session.as_mut(), tx, "create").await?;

        info!(topic = self.topic(), tid = tid; "Created task");
        Ok(tid)
    }

    /// Claim the oldest claimable pending task.
    ///
    /// Returns `None` when nothing is pending, or when every pending entry
    /// is corrupt (its listing is missing or empty). Corrupt entries are left
    /// in place and logged.
    ///
    /// A claim moves the id from pending to working and stamps its metrics in
    /// a single transaction guarded by a watch on the pending list. If
    /// another client touched the list first, the claim is discarded and the
    /// whole read-decide-claim cycle runs again after a backoff.
    pub async fn acquire(&self) -> QueueResult<Option<AcquiredTask>> {
        let mut backoff = self.retry.backoff("acquire");

        loop {
            let mut session = self.store.session().await?;
            session.watch(self.keys.pending()).await?;

            let Some(candidate) = self.first_claimable(session.as_mut()).await? else {
                session.unwatch().await?;
                return Ok(None);
            };

            let now = session.server_time().await?;
            let mut tx = Transaction::new();
            if candidate.position == 0 {
                tx.list_pop_front(self.keys.pending());
            } else {
                tx.list_remove(self.keys.pending(), candidate.tid.as_str());
            }
            tx.set_add(self.keys.working(), candidate.tid.as_str());
            self.recorder
                .acquired(&mut tx, &self.keys.metrics(&candidate.tid), now);

            if session.exec(tx).await? {
                info!(topic = self.topic(), tid = candidate.tid; "Acquired task");
                return Ok(Some(AcquiredTask {
                    tid: candidate.tid,
                    params: candidate.params,
                }));
            }

            debug!(
                topic = self.topic(),
                tid = candidate.tid,
                attempt = backoff.attempts() + 1;
                "Pending list changed during acquire, retrying"
            );
            drop(session);
            backoff.wait().await?;
        }
    }

    /// Walk the pending list from the head in windows of `scan_batch`,
    /// returning the first entry whose listing has parameters.
    async fn first_claimable(&self, session: &mut dyn StoreSession) -> QueueResult<Option<Candidate>> {
        let mut start = 0usize;

        loop {
            let stop = start + self.scan_batch - 1;
            let window = session
                .list_range(self.keys.pending(), start as isize, stop as isize)
                .await?;

            if window.is_empty() {
                if start == 0 {
                    debug!(topic = self.topic(); "No pending tasks");
                }
                return Ok(None);
            }

            for (offset, raw) in window.iter().enumerate() {
                let tid = TaskId::from(raw.as_str());
                let params = session.hash_get_all(&self.keys.listing(&tid)).await?;
                if params.is_empty() {
                    error!(
                        topic = self.topic(),
                        tid = tid,
                        position = start + offset;
                        "Pending task has no parameters, skipping"
                    );
                    continue;
                }
                return Ok(Some(Candidate {
                    position: start + offset,
                    tid,
                    params,
                }));
            }

            if window.len() < self.scan_batch {
                warn!(topic = self.topic(), scanned = start + window.len(); "Every pending task is corrupt");
                return Ok(None);
            }
            start += window.len();
        }
    }

    /// Refresh a task's heartbeat and merge `records` into its metrics.
    ///
    /// Last write wins per field. A record named `heartbeat` overrides the
    /// server timestamp. Ownership is not checked.
    pub async fn update(&self, tid: &TaskId, records: TaskParams) -> QueueResult<()> {
        let mut session = self.store.session().await?;
        let now = session.server_time().await?;

        let count = records.len();
        let mut tx = Transaction::new();
        self.recorder
            .heartbeat(&mut tx, &self.keys.metrics(tid), now, records);
        commit_unwatched(session.as_mut(), tx, "update").await?;

        debug!(topic = self.topic(), tid = tid, records = count; "Updated task");
        Ok(())
    }

    /// Remove a task from the working set and stamp its release time.
    ///
    /// Releasing a task that is not in the working set (never acquired, or
    /// already released) changes nothing and is not an error.
    pub async fn release(&self, tid: &TaskId) -> QueueResult<()> {
        let mut backoff = self.retry.backoff("release");

        loop {
            let mut session = self.store.session().await?;
            session.watch(self.keys.working()).await?;

            if !session.set_contains(self.keys.working(), tid.as_str()).await? {
                session.unwatch().await?;
                error!(topic = self.topic(), tid = tid; "Task is not in the working set, nothing to release");
                return Ok(());
            }

            let now = session.server_time().await?;
            let mut tx = Transaction::new();
            tx.set_remove(self.keys.working(), tid.as_str());
            self.recorder.released(&mut tx, &self.keys.metrics(tid), now);

            if session.exec(tx).await? {
                info!(topic = self.topic(), tid = tid; "Released task");
                return Ok(());
            }

            debug!(
                topic = self.topic(),
                tid = tid,
                attempt = backoff.attempts() + 1;
                "Working set changed during release, retrying"
            );
            drop(session);
            backoff.wait().await?;
        }
    }

    /// Pending ids, oldest first. Includes corrupt entries.
    pub async fn pending(&self) -> QueueResult<Vec<TaskId>> {
        let mut session = self.store.session().await?;
        let ids = session.list_range(self.keys.pending(), 0, -1).await?;
        Ok(ids.into_iter().map(TaskId::from).collect())
    }

    /// Working ids, sorted.
    pub async fn working(&self) -> QueueResult<Vec<TaskId>> {
        let mut session = self.store.session().await?;
        let mut ids: Vec<TaskId> = session
            .set_members(self.keys.working())
            .await?
            .into_iter()
            .map(TaskId::from)
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn stats(&self) -> QueueResult<QueueStats> {
        let mut session = self.store.session().await?;
        let pending = session.list_len(self.keys.pending()).await?;
        let working = session.set_len(self.keys.working()).await?;
        Ok(QueueStats {
            topic: self.topic().to_string(),
            pending,
            working,
        })
    }

    /// Parameters a task was created with, if its listing exists.
    pub async fn listing(&self, tid: &TaskId) -> QueueResult<Option<TaskParams>> {
        let mut session = self.store.session().await?;
        let params = session.hash_get_all(&self.keys.listing(tid)).await?;
        Ok((!params.is_empty()).then_some(params))
    }

    /// Metrics recorded for a task, if any were ever written.
    pub async fn metrics(&self, tid: &TaskId) -> QueueResult<Option<TaskMetrics>> {
        let mut session = self.store.session().await?;
        let fields = session.hash_get_all(&self.keys.metrics(tid)).await?;
        Ok((!fields.is_empty()).then(|| TaskMetrics::from_fields(fields)))
    }

    /// Current store time in epoch seconds.
    pub async fn server_time(&self) -> QueueResult<i64> {
        let mut session = self.store.session().await?;
        session.server_time().await
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("topic", &self.topic())
            .field("scan_batch", &self.scan_batch)
            .field("retry", &self.retry)
            .finish()
    }
}

struct Candidate {
    position: usize,
    tid: TaskId,
    params: TaskParams,
}

/// Commit a transaction that watched nothing. Such a transaction cannot be
/// discarded, so an abort means the session was not clean.
async fn commit_unwatched(
    session: &mut dyn StoreSession,
    tx: Transaction,
    operation: &'static str,
) -> QueueResult<()> {
    if session.exec(tx).await? {
        Ok(())
    } else {
        Err(QueueError::Store(format!(
            "{} transaction was discarded without a watch",
            operation
        )))
    }
}
