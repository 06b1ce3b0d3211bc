//! Protocol tests against the in-memory store.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tasklane_queue::*;

fn params(pairs: &[(&str, &str)]) -> TaskParams {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn queue_on(store: &MemoryStore, topic: &str) -> TaskQueue {
    let config = QueueConfig::new(topic).with_identity(WorkerIdentity::new("worker-host", 4242));
    TaskQueue::with_config(Arc::new(store.clone()), config)
}

#[tokio::test]
async fn create_then_acquire_round_trips_params() {
    let store = MemoryStore::new();
    let queue = queue_on(&store, "t");
    let sent = params(&[("url", "x"), ("size", "large")]);

    let tid = queue.create(sent.clone()).await.unwrap();
    let task = queue.acquire().await.unwrap().unwrap();

    assert_eq!(task.tid, tid);
    assert_eq!(task.params, sent);
}

#[tokio::test]
async fn acquire_is_fifo() {
    let store = MemoryStore::new();
    let queue = queue_on(&store, "t");

    let first = queue.create(params(&[("n", "1")])).await.unwrap();
    let second = queue.create(params(&[("n", "2")])).await.unwrap();
    let third = queue.create(params(&[("n", "3")])).await.unwrap();

    assert_eq!(queue.acquire().await.unwrap().unwrap().tid, first);
    assert_eq!(queue.acquire().await.unwrap().unwrap().tid, second);
    assert_eq!(queue.acquire().await.unwrap().unwrap().tid, third);
    assert!(queue.acquire().await.unwrap().is_none());
}

#[tokio::test]
async fn acquire_on_empty_queue_changes_nothing() {
    let store = MemoryStore::new();
    let queue = queue_on(&store, "t");

    assert!(queue.acquire().await.unwrap().is_none());
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn release_is_idempotent() {
    let store = MemoryStore::new();
    let queue = queue_on(&store, "t");
    queue.create(params(&[("k", "v")])).await.unwrap();
    let task = queue.acquire().await.unwrap().unwrap();

    queue.release(&task.tid).await.unwrap();
    assert!(queue.working().await.unwrap().is_empty());
    let after_first = queue.metrics(&task.tid).await.unwrap();

    queue.release(&task.tid).await.unwrap();
    assert!(queue.working().await.unwrap().is_empty());
    assert_eq!(queue.metrics(&task.tid).await.unwrap(), after_first);
}

#[tokio::test]
async fn release_of_unknown_task_is_soft() {
    let store = MemoryStore::new();
    let queue = queue_on(&store, "t");

    queue.release(&TaskId::from("0000000000000000")).await.unwrap();
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn update_merges_fields() {
    let store = MemoryStore::new();
    let queue = queue_on(&store, "t");
    queue.create(params(&[("k", "v")])).await.unwrap();
    let task = queue.acquire().await.unwrap().unwrap();

    queue
        .update(&task.tid, params(&[("progress", "10"), ("stage", "download")]))
        .await
        .unwrap();
    queue
        .update(&task.tid, params(&[("progress", "60")]))
        .await
        .unwrap();

    let metrics = queue.metrics(&task.tid).await.unwrap().unwrap();
    assert_eq!(metrics.get("progress"), Some("60"));
    assert_eq!(metrics.get("stage"), Some("download"));
    assert_eq!(metrics.hostname(), Some("worker-host"));
    assert!(metrics.last_acquired().is_some());
}

#[tokio::test]
async fn update_without_ownership_only_writes_metrics() {
    let store = MemoryStore::with_clock(|| 77);
    let queue = queue_on(&store, "t");
    let stray = TaskId::from("feedfacefeedface");

    queue.update(&stray, params(&[("note", "hi")])).await.unwrap();

    assert_eq!(store.keys(), vec!["t:metrics:feedfacefeedface".to_string()]);
    let metrics = queue.metrics(&stray).await.unwrap().unwrap();
    assert_eq!(metrics.heartbeat(), Some(77));
    assert_eq!(metrics.get("note"), Some("hi"));
}

#[tokio::test]
async fn timestamps_come_from_the_store_clock() {
    let now = Arc::new(AtomicU32::new(1_000));
    let clock = now.clone();
    let store = MemoryStore::with_clock(move || clock.load(Ordering::SeqCst) as i64);
    let queue = queue_on(&store, "t");

    queue.create(params(&[("k", "v")])).await.unwrap();
    let task = queue.acquire().await.unwrap().unwrap();
    now.store(1_030, Ordering::SeqCst);
    queue.update(&task.tid, TaskParams::new()).await.unwrap();
    now.store(1_045, Ordering::SeqCst);
    queue.release(&task.tid).await.unwrap();

    let metrics = queue.metrics(&task.tid).await.unwrap().unwrap();
    assert_eq!(metrics.last_acquired(), Some(1_000));
    assert_eq!(metrics.heartbeat(), Some(1_030));
    assert_eq!(metrics.last_released(), Some(1_045));
}

#[tokio::test]
async fn full_lifecycle_scenario() {
    let store = MemoryStore::new();
    let queue = queue_on(&store, "t");

    let tid = queue.create(params(&[("url", "x")])).await.unwrap();

    let task = queue.acquire().await.unwrap().unwrap();
    assert_eq!(task.tid, tid);
    assert_eq!(task.params, params(&[("url", "x")]));
    assert!(queue.pending().await.unwrap().is_empty());
    assert_eq!(queue.working().await.unwrap(), vec![tid.clone()]);

    queue
        .update(&tid, params(&[("progress", "50")]))
        .await
        .unwrap();
    let metrics = queue.metrics(&tid).await.unwrap().unwrap();
    for field in ["heartbeat", "last-acquired", "hostname", "pid"] {
        assert!(metrics.get(field).is_some(), "missing {}", field);
    }
    assert_eq!(metrics.get("progress"), Some("50"));

    queue.release(&tid).await.unwrap();
    assert!(queue.working().await.unwrap().is_empty());
    let metrics = queue.metrics(&tid).await.unwrap().unwrap();
    assert!(metrics.last_released().is_some());
    assert_eq!(metrics.get("progress"), Some("50"));
}

#[tokio::test]
async fn corrupt_head_is_skipped_and_left_in_place() {
    let store = MemoryStore::new();
    let queue = queue_on(&store, "t");

    let corrupt = queue.create(params(&[("n", "1")])).await.unwrap();
    let good = queue.create(params(&[("n", "2")])).await.unwrap();
    assert!(store.remove_key(&queue.keys().listing(&corrupt)));

    let task = queue.acquire().await.unwrap().unwrap();
    assert_eq!(task.tid, good);
    assert_eq!(queue.pending().await.unwrap(), vec![corrupt.clone()]);
    assert_eq!(queue.working().await.unwrap(), vec![good]);

    // only the corrupt entry is left
    assert!(queue.acquire().await.unwrap().is_none());
    assert_eq!(queue.pending().await.unwrap(), vec![corrupt]);
}

#[tokio::test]
async fn corrupt_entries_beyond_one_scan_window() {
    let store = MemoryStore::new();
    let config = QueueConfig::new("t")
        .with_scan_batch(2)
        .with_identity(WorkerIdentity::new("h", 1));
    let queue = TaskQueue::with_config(Arc::new(store.clone()), config);

    let mut corrupt = Vec::new();
    for i in 0..5 {
        let tid = queue.create(params(&[("i", i.to_string().as_str())])).await.unwrap();
        store.remove_key(&queue.keys().listing(&tid));
        corrupt.push(tid);
    }
    let good = queue.create(params(&[("i", "5")])).await.unwrap();

    let task = queue.acquire().await.unwrap().unwrap();
    assert_eq!(task.tid, good);
    assert_eq!(queue.pending().await.unwrap(), corrupt);
}

#[tokio::test]
async fn only_corrupt_entries_yields_none() {
    let store = MemoryStore::new();
    let queue = queue_on(&store, "t");
    let tid = queue.create(params(&[("k", "v")])).await.unwrap();
    store.remove_key(&queue.keys().listing(&tid));

    assert!(queue.acquire().await.unwrap().is_none());
    assert!(queue.working().await.unwrap().is_empty());
    assert_eq!(queue.metrics(&tid).await.unwrap(), None);
}

#[tokio::test]
async fn topics_do_not_share_tasks() {
    let store = MemoryStore::new();
    let images = queue_on(&store, "images");
    let emails = queue_on(&store, "emails");

    images.create(params(&[("k", "v")])).await.unwrap();

    assert!(emails.acquire().await.unwrap().is_none());
    assert!(images.acquire().await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_acquires_claim_each_task_once() {
    const TASKS: usize = 20;
    const CALLERS: usize = 48;

    let store = MemoryStore::new();
    let queue = queue_on(&store, "race");
    let mut created = HashSet::new();
    for i in 0..TASKS {
        created.insert(queue.create(params(&[("i", i.to_string().as_str())])).await.unwrap());
    }

    let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS));
    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let queue = queue.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            queue.acquire().await
        }));
    }

    let mut claimed = Vec::new();
    let mut empty = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Some(task) => claimed.push(task.tid),
            None => empty += 1,
        }
    }

    assert_eq!(claimed.len(), TASKS);
    assert_eq!(empty, CALLERS - TASKS);
    let unique: HashSet<_> = claimed.into_iter().collect();
    assert_eq!(unique, created);
    assert!(queue.pending().await.unwrap().is_empty());
    assert_eq!(queue.working().await.unwrap().len(), TASKS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_releases_empty_the_working_set() {
    let store = MemoryStore::new();
    let queue = queue_on(&store, "t");

    let mut tids = Vec::new();
    for i in 0..10 {
        queue.create(params(&[("i", i.to_string().as_str())])).await.unwrap();
        tids.push(queue.acquire().await.unwrap().unwrap().tid);
    }

    let mut handles = Vec::new();
    for tid in tids.iter().cloned() {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move { queue.release(&tid).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(queue.working().await.unwrap().is_empty());
    for tid in &tids {
        let metrics = queue.metrics(tid).await.unwrap().unwrap();
        assert!(metrics.last_released().is_some());
    }
}

/// Store whose first `aborts` watched transactions are discarded.
struct ContendedStore {
    inner: MemoryStore,
    aborts: Arc<AtomicU32>,
}

struct ContendedSession {
    inner: Box<dyn StoreSession>,
    aborts: Arc<AtomicU32>,
    watching: bool,
}

#[async_trait]
impl TaskStore for ContendedStore {
    async fn session(&self) -> QueueResult<Box<dyn StoreSession>> {
        Ok(Box::new(ContendedSession {
            inner: self.inner.session().await?,
            aborts: self.aborts.clone(),
            watching: false,
        }))
    }
}

#[async_trait]
impl StoreSession for ContendedSession {
    async fn watch(&mut self, key: &str) -> QueueResult<()> {
        self.watching = true;
        self.inner.watch(key).await
    }

    async fn unwatch(&mut self) -> QueueResult<()> {
        self.watching = false;
        self.inner.unwatch().await
    }

    async fn list_range(&mut self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>> {
        self.inner.list_range(key, start, stop).await
    }

    async fn list_len(&mut self, key: &str) -> QueueResult<usize> {
        self.inner.list_len(key).await
    }

    async fn hash_get_all(
        &mut self,
        key: &str,
    ) -> QueueResult<std::collections::HashMap<String, String>> {
        self.inner.hash_get_all(key).await
    }

    async fn set_contains(&mut self, key: &str, member: &str) -> QueueResult<bool> {
        self.inner.set_contains(key, member).await
    }

    async fn set_members(&mut self, key: &str) -> QueueResult<Vec<String>> {
        self.inner.set_members(key).await
    }

    async fn set_len(&mut self, key: &str) -> QueueResult<usize> {
        self.inner.set_len(key).await
    }

    async fn server_time(&mut self) -> QueueResult<i64> {
        self.inner.server_time().await
    }

    async fn exec(&mut self, tx: Transaction) -> QueueResult<bool> {
        let watching = std::mem::replace(&mut self.watching, false);
        if watching
            && self
                .aborts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            self.inner.unwatch().await?;
            return Ok(false);
        }
        self.inner.exec(tx).await
    }
}

fn contended(aborts: u32, retry: RetryPolicy) -> (MemoryStore, TaskQueue, Arc<AtomicU32>) {
    let inner = MemoryStore::new();
    let counter = Arc::new(AtomicU32::new(aborts));
    let store = ContendedStore {
        inner: inner.clone(),
        aborts: counter.clone(),
    };
    let queue = TaskQueue::with_config(Arc::new(store), QueueConfig::new("t").with_retry(retry));
    (inner, queue, counter)
}

#[tokio::test]
async fn lost_transactions_are_retried_transparently() {
    let (_, queue, aborts) = contended(3, RetryPolicy::immediate());
    let tid = queue.create(params(&[("k", "v")])).await.unwrap();

    let task = queue.acquire().await.unwrap().unwrap();
    assert_eq!(task.tid, tid);
    assert_eq!(aborts.load(Ordering::SeqCst), 0);

    aborts.store(2, Ordering::SeqCst);
    queue.release(&tid).await.unwrap();
    assert!(queue.working().await.unwrap().is_empty());
}

#[tokio::test]
async fn bounded_retry_reports_contention() {
    let (inner, queue, _) = contended(10, RetryPolicy::immediate().with_max_attempts(3));
    let tid = queue.create(params(&[("k", "v")])).await.unwrap();

    let err = queue.acquire().await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::ContentionExhausted {
            operation: "acquire",
            attempts: 3
        }
    ));

    // nothing was claimed
    let mut session = inner.session().await.unwrap();
    assert_eq!(session.list_range("t:pending", 0, -1).await.unwrap(), vec![tid.to_string()]);
    assert_eq!(session.set_len("t:working").await.unwrap(), 0);
}
