//! Fixed-size worker pool draining one bounded FIFO queue.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use taskforge_core::{FailureOutcome, Task, TaskStatus, due_in};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, EngineResult, Rejected};
use crate::handler::{HandlerError, HandlerRegistry, TaskContext};
use crate::retry::BackoffPolicy;
use crate::store::TaskStore;
use crate::timeline::{PromotionTarget, Timeline, lock, spawn_ticker};

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Name for logging
    pub name: String,
    pub workers: usize,
    /// Queue capacity
    pub capacity: usize,
    /// How long `enqueue` waits for space
    pub enqueue_timeout: Duration,
    /// Per-attempt deadline handed to handlers
    pub handler_timeout: Duration,
    pub backoff: BackoffPolicy,
    /// How often parked retries are checked
    pub retry_tick: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "worker-pool".to_string(),
            workers: 1,
            capacity: 100,
            enqueue_timeout: Duration::from_secs(5),
            handler_timeout: Duration::from_secs(30 * 60),
            backoff: BackoffPolicy::default(),
            retry_tick: Duration::from_secs(1),
        }
    }
}

impl PoolConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retry_tick(mut self, tick: Duration) -> Self {
        self.retry_tick = tick;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.workers == 0 {
            return Err(EngineError::invalid_config(format!(
                "pool `{}` needs at least one worker",
                self.name
            )));
        }
        if self.capacity == 0 {
            return Err(EngineError::invalid_config(format!(
                "pool `{}` needs a queue capacity > 0",
                self.name
            )));
        }
        if self.retry_tick.is_zero() {
            return Err(EngineError::invalid_config("retry tick must be > 0"));
        }
        Ok(())
    }
}

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub workers: usize,
    /// Buffered, not yet picked up
    pub queued: usize,
    pub in_flight: usize,
    /// Parked on the retry timeline
    pub waiting_retries: usize,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

/// Sending side of the queue. Retries re-enter through here too.
struct Intake {
    name: String,
    tx: mpsc::Sender<Task>,
    closed: AtomicBool,
    timeout: Duration,
}

impl Intake {
    async fn push(&self, task: Task) -> Result<(), Rejected> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Rejected::new(task, self.closed_error()));
        }
        let task_id = task.id;
        match self.tx.send_timeout(task, self.timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(task)) => Err(Rejected::new(
                task,
                EngineError::QueueFullTimeout {
                    pool: self.name.clone(),
                    task_id,
                    timeout: self.timeout,
                },
            )),
            Err(SendTimeoutError::Closed(task)) => Err(Rejected::new(task, self.closed_error())),
        }
    }

    fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    fn closed_error(&self) -> EngineError {
        EngineError::PoolClosed {
            pool: self.name.clone(),
        }
    }
}

#[async_trait]
impl PromotionTarget for Intake {
    async fn promote(&self, task: Task) -> Result<(), Rejected> {
        self.push(task).await
    }
}

/// `workers` tokio tasks sharing one bounded queue.
///
/// Must be started inside a Tokio runtime.
pub struct WorkerPool {
    config: PoolConfig,
    intake: Arc<Intake>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    retries: Arc<Timeline<u64>>,
    counters: Arc<Counters>,
    root: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn start(
        config: PoolConfig,
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn TaskStore>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.capacity);
        let intake = Arc::new(Intake {
            name: config.name.clone(),
            tx,
            closed: AtomicBool::new(false),
            timeout: config.enqueue_timeout,
        });
        let receiver = Arc::new(tokio::sync::Mutex::new(rx));
        // Retries are keyed by ticket so two copies of one task id never collide.
        let retries = Arc::new(Timeline::new(format!("{}-retries", config.name), 0));
        let counters = Arc::new(Counters::default());
        let root = CancellationToken::new();
        let tickets = Arc::new(AtomicU64::new(0));

        let workers = (0..config.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    pool: config.name.clone(),
                    receiver: receiver.clone(),
                    registry: registry.clone(),
                    store: store.clone(),
                    retries: retries.clone(),
                    tickets: tickets.clone(),
                    counters: counters.clone(),
                    backoff: config.backoff,
                    handler_timeout: config.handler_timeout,
                    root: root.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let ticker = spawn_ticker(
            retries.clone(),
            intake.clone(),
            store,
            config.retry_tick,
            root.child_token(),
        );

        info!(
            pool = %config.name,
            workers = config.workers,
            capacity = config.capacity,
            "worker pool started"
        );

        Ok(Self {
            config,
            intake,
            receiver,
            retries,
            counters,
            root,
            workers: Mutex::new(workers),
            ticker: Mutex::new(Some(ticker)),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Append a pending task to the back of the queue, waiting up to the
    /// enqueue timeout for space.
    pub async fn enqueue(&self, task: Task) -> Result<(), Rejected> {
        if task.status != TaskStatus::Pending {
            let error = EngineError::invalid_state(
                task.id,
                format!("only pending tasks can be enqueued, status is {}", task.status),
            );
            return Err(Rejected::new(task, error));
        }
        if let Err(e) = task.validate() {
            return Err(Rejected::new(task, e.into()));
        }

        let task_id = task.id;
        self.intake.push(task).await.inspect_err(|rejected| {
            debug!(
                pool = %self.config.name,
                task_id = %task_id,
                error = %rejected.error,
                "enqueue refused"
            );
        })?;
        debug!(pool = %self.config.name, task_id = %task_id, "task enqueued");
        Ok(())
    }

    /// Tasks buffered in the queue, not counting in-flight ones.
    pub fn queue_size(&self) -> usize {
        self.intake.depth()
    }

    pub fn is_closed(&self) -> bool {
        self.intake.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.config.name.clone(),
            workers: self.config.workers,
            queued: self.queue_size(),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            waiting_retries: self.retries.len(),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
        }
    }

    /// Stop intake, let every worker finish its current task, then stop.
    ///
    /// Tasks still buffered or waiting for a retry are discarded. Safe to
    /// call more than once.
    pub async fn shutdown(&self) {
        self.root.cancel();
        if !self.intake.closed.swap(true, Ordering::AcqRel) {
            info!(pool = %self.config.name, "worker pool shutting down");
        }

        let ticker = lock(&self.ticker).take();
        if let Some(ticker) = ticker {
            if let Err(e) = ticker.await {
                error!(pool = %self.config.name, error = %e, "retry ticker failed");
            }
        }

        let workers = std::mem::take(&mut *lock(&self.workers));
        for handle in workers {
            if let Err(e) = handle.await {
                error!(pool = %self.config.name, error = %e, "worker ended abnormally");
            }
        }

        let mut rx = self.receiver.lock().await;
        rx.close();
        let mut discarded = 0usize;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        let parked = self.retries.drain().len();
        if discarded + parked > 0 {
            warn!(
                pool = %self.config.name,
                queued = discarded,
                retries = parked,
                "discarded unfinished tasks on shutdown"
            );
        }
        debug!(pool = %self.config.name, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

struct Worker {
    id: usize,
    pool: String,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn TaskStore>,
    retries: Arc<Timeline<u64>>,
    tickets: Arc<AtomicU64>,
    counters: Arc<Counters>,
    backoff: BackoffPolicy,
    handler_timeout: Duration,
    root: CancellationToken,
}

impl Worker {
    async fn run(self) {
        debug!(pool = %self.pool, worker = self.id, "worker started");

        loop {
            let next = {
                let mut rx = self.receiver.lock().await;
                tokio::select! {
                    biased;
                    _ = self.root.cancelled() => None,
                    task = rx.recv() => task,
                }
            };
            let Some(task) = next else { break };
            self.process(task).await;
        }

        debug!(pool = %self.pool, worker = self.id, "worker stopped");
    }

    async fn process(&self, mut task: Task) {
        task.begin_attempt();
        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        self.report(&task);

        let Some(handler) = self.registry.get(&task.task_type) else {
            let err = EngineError::NoHandlerRegistered {
                task_type: task.task_type.clone(),
            };
            warn!(
                pool = %self.pool,
                task_id = %task.id,
                task_type = %task.task_type,
                "no handler registered"
            );
            task.fail(err.to_string());
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            self.finish(&task);
            return;
        };

        debug!(
            pool = %self.pool,
            worker = self.id,
            task_id = %task.id,
            task_type = %task.task_type,
            attempt = task.retry_count + 1,
            "executing task"
        );

        let scope = self.root.child_token();
        let ctx = TaskContext::new(task.clone(), scope.clone(), self.handler_timeout);
        let deadline = ctx.deadline();
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            scope.cancel();
        });

        // Own task so a panicking handler only fails its attempt.
        let outcome = match tokio::spawn(async move { handler.handle(ctx).await }).await {
            Ok(outcome) => outcome,
            Err(e) => Err(HandlerError::failed(format!("handler panicked: {e}"))),
        };
        watchdog.abort();

        match outcome {
            Ok(result) => {
                task.complete(result);
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(pool = %self.pool, task_id = %task.id, "task completed");
                self.finish(&task);
            }
            Err(err) => {
                let message = EngineError::from(err).to_string();
                match task.record_failure(message.clone()) {
                    FailureOutcome::Retry { retry } => self.park_retry(task, retry),
                    FailureOutcome::Exhausted => {
                        self.counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            pool = %self.pool,
                            task_id = %task.id,
                            retries = task.retry_count,
                            error = %message,
                            "task failed, retries exhausted"
                        );
                        self.finish(&task);
                    }
                }
            }
        }
    }

    /// Back to pending; re-enters the queue once the backoff has passed.
    fn park_retry(&self, task: Task, retry: u32) {
        let delay = self.backoff.delay_for_retry(retry);
        let due = due_in(delay);

        self.counters.retried.fetch_add(1, Ordering::Relaxed);
        debug!(
            pool = %self.pool,
            task_id = %task.id,
            retry,
            delay_ms = delay.as_millis() as u64,
            error = task.error.as_deref().unwrap_or_default(),
            "scheduling retry"
        );
        self.finish(&task);

        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        self.retries.insert(ticket, task, due);
    }

    fn finish(&self, task: &Task) {
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.report(task);
    }

    fn report(&self, task: &Task) {
        if let Err(e) = self.store.update(task) {
            warn!(pool = %self.pool, task_id = %task.id, error = %e, "failed to record task state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerResult;
    use crate::store::InMemoryTaskStore;
    use std::sync::atomic::AtomicU32;
    use taskforge_core::Payload;
    use tokio::sync::Semaphore;

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> PoolConfig {
        PoolConfig::default()
            .with_name("test")
            .with_enqueue_timeout(Duration::from_millis(100))
            .with_backoff(BackoffPolicy::linear(Duration::from_millis(5), 5))
            .with_retry_tick(Duration::from_millis(5))
    }

    fn ok() -> HandlerResult {
        Ok(Payload::new())
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !cond() {
            assert!(tokio::time::Instant::now() < deadline, "condition not reached");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    #[tokio::test]
    async fn full_queue_times_out_and_hands_task_back() {
        let gate = Arc::new(Semaphore::new(0));
        let mut registry = HandlerRegistry::new();
        let g = gate.clone();
        registry.register("block", move |_ctx: TaskContext| {
            let g = g.clone();
            async move {
                let _permit = g.acquire().await.map_err(|e| HandlerError::failed(e.to_string()))?;
                ok()
            }
        });
        let store = InMemoryTaskStore::arc();
        let pool =
            WorkerPool::start(config().with_capacity(1), registry.into_shared(), store.clone())
                .unwrap();

        pool.enqueue(Task::new("block", Payload::new())).await.unwrap();
        wait_until(|| pool.stats().in_flight == 1).await;

        // The single worker is busy: one slot left, then backpressure.
        pool.enqueue(Task::new("block", Payload::new())).await.unwrap();
        let third = Task::new("block", Payload::new());
        let third_id = third.id;
        let rejected = pool.enqueue(third).await.unwrap_err();
        assert!(rejected.error.is_backpressure());
        assert_eq!(rejected.task.id, third_id);
        assert_eq!(pool.queue_size(), 1);

        gate.add_permits(2);
        wait_until(|| pool.stats().completed == 2).await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn fifo_within_one_pool() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        let s = seen.clone();
        registry.register("record", move |ctx: TaskContext| {
            let s = s.clone();
            async move {
                let n = ctx.payload()["n"].as_u64().unwrap_or_default();
                lock(&s).push(n);
                ok()
            }
        });
        let pool = WorkerPool::start(
            config(),
            registry.into_shared(),
            Arc::new(crate::store::NoopTaskStore),
        )
        .unwrap();

        for n in 0..20u64 {
            let mut payload = Payload::new();
            payload.insert("n".into(), n.into());
            pool.enqueue(Task::new("record", payload)).await.unwrap();
        }
        wait_until(|| pool.stats().completed == 20).await;

        assert_eq!(*lock(&seen), (0..20).collect::<Vec<u64>>());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_type_fails_without_retry() {
        let store = InMemoryTaskStore::arc();
        let pool =
            WorkerPool::start(config(), HandlerRegistry::new().into_shared(), store.clone())
                .unwrap();
        let task = Task::new("x", Payload::new());
        let id = task.id;

        pool.enqueue(task).await.unwrap();
        let done = store.wait_for_terminal(id, WAIT).await.unwrap();

        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.retry_count, 0);
        assert!(done.error.unwrap().contains("x"));
        assert_eq!(pool.stats().retried, 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = HandlerRegistry::new();
        let c = calls.clone();
        registry.register("flaky", move |_ctx: TaskContext| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(HandlerError::failed("not yet"))
                } else {
                    ok()
                }
            }
        });
        let store = InMemoryTaskStore::arc();
        let pool = WorkerPool::start(config(), registry.into_shared(), store.clone()).unwrap();
        let task = Task::new("flaky", Payload::new()).with_max_retries(3);
        let id = task.id;

        pool.enqueue(task).await.unwrap();
        let done = store.wait_for_terminal(id, WAIT).await.unwrap();

        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.retry_count, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(pool.stats().retried, 2);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn exhausted_retries_fail_at_max() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = HandlerRegistry::new();
        let c = calls.clone();
        registry.register("broken", move |_ctx: TaskContext| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<Payload, _>(HandlerError::failed("boom"))
            }
        });
        let store = InMemoryTaskStore::arc();
        let pool = WorkerPool::start(config(), registry.into_shared(), store.clone()).unwrap();
        let task = Task::new("broken", Payload::new()).with_max_retries(2);
        let id = task.id;

        pool.enqueue(task).await.unwrap();
        let done = store.wait_for_terminal(id, WAIT).await.unwrap();

        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.retry_count, 2);
        assert_eq!(done.error.as_deref(), Some("handler failed: boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn out_of_range_backoff_parks_the_retry() {
        let mut registry = HandlerRegistry::new();
        registry.register("broken", |_ctx: TaskContext| async move {
            Err::<Payload, _>(HandlerError::failed("boom"))
        });
        let store = InMemoryTaskStore::arc();
        let huge_unit = Duration::from_millis(2_000_000_000_000_000);
        let pool = WorkerPool::start(
            config().with_backoff(BackoffPolicy::linear(huge_unit, 5)),
            registry.into_shared(),
            store.clone(),
        )
        .unwrap();
        let task = Task::new("broken", Payload::new());
        let id = task.id;

        pool.enqueue(task).await.unwrap();
        wait_until(|| pool.stats().waiting_retries == 1).await;

        let stats = pool.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.retried, 1);
        let parked = store.get(id).unwrap();
        assert_eq!(parked.status, TaskStatus::Pending);
        assert_eq!(parked.retry_count, 1);

        // Workers are still alive.
        pool.enqueue(Task::new("broken", Payload::new()).with_max_retries(0))
            .await
            .unwrap();
        wait_until(|| pool.stats().failed == 1).await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn deadline_cancels_the_attempt_scope() {
        let mut registry = HandlerRegistry::new();
        registry.register("stuck", |ctx: TaskContext| async move {
            ctx.cancelled().await;
            Err::<Payload, _>(ctx.interruption())
        });
        let store = InMemoryTaskStore::arc();
        let pool = WorkerPool::start(
            config().with_handler_timeout(Duration::from_millis(20)),
            registry.into_shared(),
            store.clone(),
        )
        .unwrap();
        let task = Task::new("stuck", Payload::new()).with_max_retries(0);
        let id = task.id;

        pool.enqueue(task).await.unwrap();
        let done = store.wait_for_terminal(id, WAIT).await.unwrap();

        assert_eq!(done.status, TaskStatus::Failed);
        assert!(done.error.unwrap().contains("exceeded"));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn panicking_handler_fails_the_attempt_only() {
        let mut registry = HandlerRegistry::new();
        registry.register("panic", |_ctx: TaskContext| async move {
            if true {
                panic!("handler bug");
            }
            ok()
        });
        registry.register("echo", |_ctx: TaskContext| async move { ok() });
        let store = InMemoryTaskStore::arc();
        let pool = WorkerPool::start(config(), registry.into_shared(), store.clone()).unwrap();

        let bad = Task::new("panic", Payload::new()).with_max_retries(0);
        let good = Task::new("echo", Payload::new());
        let (bad_id, good_id) = (bad.id, good.id);
        pool.enqueue(bad).await.unwrap();
        pool.enqueue(good).await.unwrap();

        assert_eq!(store.wait_for_terminal(bad_id, WAIT).await.unwrap().status, TaskStatus::Failed);
        assert_eq!(
            store.wait_for_terminal(good_id, WAIT).await.unwrap().status,
            TaskStatus::Completed
        );
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_and_closes_intake() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut registry = HandlerRegistry::new();
        let f = finished.clone();
        registry.register("slow", move |_ctx: TaskContext| {
            let f = f.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                f.store(true, Ordering::SeqCst);
                ok()
            }
        });
        let pool =
            WorkerPool::start(config(), registry.into_shared(), InMemoryTaskStore::arc()).unwrap();

        pool.enqueue(Task::new("slow", Payload::new())).await.unwrap();
        wait_until(|| pool.stats().in_flight == 1).await;
        pool.shutdown().await;

        assert!(finished.load(Ordering::SeqCst));
        assert!(pool.is_closed());
        let rejected = pool.enqueue(Task::new("slow", Payload::new())).await.unwrap_err();
        assert!(matches!(rejected.error, EngineError::PoolClosed { .. }));

        // second call is a no-op
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn rejects_tasks_that_are_not_pending() {
        let pool = WorkerPool::start(
            config(),
            HandlerRegistry::new().into_shared(),
            InMemoryTaskStore::arc(),
        )
        .unwrap();
        let mut task = Task::new("echo", Payload::new());
        task.begin_attempt();

        let rejected = pool.enqueue(task).await.unwrap_err();
        assert!(matches!(rejected.error, EngineError::InvalidState { .. }));
        pool.shutdown().await;
    }

    #[test]
    fn zero_workers_is_invalid() {
        let err = config().with_workers(0).validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }
}
