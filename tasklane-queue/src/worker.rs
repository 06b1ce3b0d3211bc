//! Worker runner for processing tasks from one topic.
//!
//! The runner is a thin loop over the queue operations: acquire, run the
//! handler while heartbeating, release. A failing handler still releases its
//! task; the failure is recorded in the task's metrics under `last-error`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tasklane_log::{debug, error, info, warn};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

use crate::error::{QueueError, QueueResult};
use crate::queue::TaskQueue;
use crate::recorder::fields;
use crate::task::{AcquiredTask, TaskId, TaskParams};

/// Task handler function type.
pub type TaskHandler =
    Arc<dyn Fn(TaskContext) -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> + Send + Sync>;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of tasks processed at once
    pub concurrency: usize,

    /// Wait after finding nothing claimable
    pub poll_interval: Duration,

    /// Heartbeat cadence while a handler runs
    pub heartbeat_interval: Duration,

    /// Upper bound on one handler run
    pub task_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(30),
            task_timeout: None,
        }
    }
}

impl WorkerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }
}

/// What a handler sees of the task it is running.
#[derive(Clone)]
pub struct TaskContext {
    queue: TaskQueue,
    task: AcquiredTask,
}

impl TaskContext {
    pub fn tid(&self) -> &TaskId {
        &self.task.tid
    }

    pub fn params(&self) -> &TaskParams {
        &self.task.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.task.params.get(name).map(String::as_str)
    }

    /// Merge progress records into the task's metrics and refresh its
    /// heartbeat.
    pub async fn progress(&self, records: TaskParams) -> QueueResult<()> {
        self.queue.update(&self.task.tid, records).await
    }
}

/// Processes tasks from a queue with a single handler.
pub struct Worker {
    queue: TaskQueue,
    handler: TaskHandler,
    config: WorkerConfig,
    running: Arc<RwLock<bool>>,
    shutdown: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

impl Worker {
    pub fn new<F, Fut>(queue: TaskQueue, handler: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        Self::with_config(queue, handler, WorkerConfig::default())
    }

    /// Create a worker with custom configuration.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use tasklane_queue::*;
    ///
    /// # async fn example() -> QueueResult<()> {
    /// let queue = TaskQueue::new(Arc::new(MemoryStore::new()), "thumbnails");
    /// let config = WorkerConfig::default().with_concurrency(4);
    ///
    /// let mut worker = Worker::with_config(queue, |ctx: TaskContext| async move {
    ///     let path = ctx.param("path").unwrap_or_default().to_string();
    ///     println!("resizing {}", path);
    ///     Ok(())
    /// }, config);
    ///
    /// worker.start().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_config<F, Fut>(queue: TaskQueue, handler: F, config: WorkerConfig) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        let handler: TaskHandler = Arc::new(
            move |ctx: TaskContext| -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> {
                Box::pin(handler(ctx))
            },
        );

        Self {
            queue,
            handler,
            config,
            running: Arc::new(RwLock::new(false)),
            shutdown: None,
            handles: Vec::new(),
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Acquire and process at most one task in the calling task.
    ///
    /// Returns `false` when nothing was claimable. A handler failure is
    /// recorded on the task, not returned.
    pub async fn run_once(&self) -> QueueResult<bool> {
        match self.queue.acquire().await? {
            Some(task) => {
                process(&self.queue, &self.handler, &self.config, task, "main").await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Spawn `concurrency` processing loops.
    pub async fn start(&mut self) -> QueueResult<()> {
        let mut running = self.running.write().await;
        if *running {
            return Err(QueueError::WorkerAlreadyRunning);
        }
        *running = true;
        drop(running);

        info!(
            topic = self.queue.topic(),
            concurrency = self.config.concurrency;
            "Starting worker"
        );

        let (tx, rx) = watch::channel(false);
        self.shutdown = Some(tx);

        for i in 0..self.config.concurrency.max(1) {
            let queue = self.queue.clone();
            let handler = self.handler.clone();
            let config = self.config.clone();
            let mut shutdown = rx.clone();
            let name = format!("worker-{}", i);

            let handle = tokio::spawn(async move {
                while !stopping(&shutdown) {
                    let keep_going = match queue.acquire().await {
                        Ok(Some(task)) => {
                            process(&queue, &handler, &config, task, &name).await;
                            true
                        }
                        Ok(None) => idle(&mut shutdown, config.poll_interval).await,
                        Err(e) => {
                            error!(topic = queue.topic(), worker = name; "Error acquiring task: {}", e);
                            idle(&mut shutdown, config.poll_interval).await
                        }
                    };
                    if !keep_going {
                        break;
                    }
                }

                debug!(topic = queue.topic(), worker = name; "Stopped");
            });

            self.handles.push(handle);
        }

        Ok(())
    }

    /// Stop the worker.
    ///
    /// Loops finish the task they are running, release it, then exit.
    pub async fn stop(&mut self) -> QueueResult<()> {
        let mut running = self.running.write().await;
        if !*running {
            return Err(QueueError::WorkerNotRunning);
        }
        *running = false;
        drop(running);

        info!(topic = self.queue.topic(); "Stopping worker");

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(topic = self.queue.topic(); "Worker loop ended abnormally: {}", e);
            }
        }

        info!(topic = self.queue.topic(); "Worker stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

impl Drop for Worker {
    /// Loops of a worker dropped without `stop` finish their current task
    /// and exit on their own.
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
    }
}

/// Shutdown was requested, or the owning `Worker` is gone.
fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
    let requested = *shutdown.borrow();
    requested || shutdown.has_changed().is_err()
}

/// Sleep for `interval` unless shutdown is signalled first.
///
/// Returns `false` when the loop should exit.
async fn idle(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => !stopping(shutdown),
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

/// Run the handler with a heartbeat, record any failure, always release.
async fn process(
    queue: &TaskQueue,
    handler: &TaskHandler,
    config: &WorkerConfig,
    task: AcquiredTask,
    worker: &str,
) {
    let tid = task.tid.clone();
    debug!(topic = queue.topic(), tid = tid, worker = worker; "Processing task");

    let ctx = TaskContext {
        queue: queue.clone(),
        task,
    };
    let run = run_with_timeout(handler(ctx), config.task_timeout);
    tokio::pin!(run);

    let period = config.heartbeat_interval.max(Duration::from_millis(1));
    let mut heartbeat = tokio::time::interval(period);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the acquire already stamped a heartbeat
    heartbeat.tick().await;

    let outcome = loop {
        tokio::select! {
            result = &mut run => break result,
            _ = heartbeat.tick() => {
                if let Err(e) = queue.update(&tid, TaskParams::new()).await {
                    warn!(topic = queue.topic(), tid = tid; "Heartbeat failed: {}", e);
                }
            }
        }
    };

    match outcome {
        Ok(()) => {
            debug!(topic = queue.topic(), tid = tid, worker = worker; "Task completed");
        }
        Err(e) => {
            error!(topic = queue.topic(), tid = tid, worker = worker; "Task failed: {}", e);
            let mut records = TaskParams::new();
            records.insert(fields::LAST_ERROR.to_string(), e.to_string());
            if let Err(err) = queue.update(&tid, records).await {
                error!(topic = queue.topic(), tid = tid; "Failed to record task error: {}", err);
            }
        }
    }

    if let Err(e) = queue.release(&tid).await {
        error!(topic = queue.topic(), tid = tid; "Failed to release task: {}", e);
    }
}

async fn run_with_timeout<F>(run: F, timeout: Option<Duration>) -> QueueResult<()>
where
    F: Future<Output = QueueResult<()>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .unwrap_or_else(|_| Err(QueueError::handler(format!("timed out after {:?}", limit)))),
        None => run.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert!(config.task_timeout.is_none());
    }

    #[test]
    fn config_builders() {
        let config = WorkerConfig::default()
            .with_concurrency(0)
            .with_poll_interval(Duration::from_millis(10))
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_task_timeout(Duration::from_secs(60));

        assert_eq!(config.concurrency, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.task_timeout, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn timeout_becomes_handler_error() {
        let result = run_with_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
            Some(Duration::from_millis(5)),
        )
        .await;

        assert!(matches!(result, Err(QueueError::Handler(_))));
    }
}
