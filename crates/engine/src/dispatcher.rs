//! Holds tasks until their scheduled time, then hands them to the router.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskforge_core::{Task, TaskId, TaskStatus};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{EngineError, EngineResult};
use crate::store::TaskStore;
use crate::timeline::{CancelMiss, PromotionTarget, Timeline, lock, spawn_ticker};

pub struct DelayedDispatcher {
    timeline: Arc<Timeline<TaskId>>,
    stop: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl DelayedDispatcher {
    /// Start promoting due tasks into `target` every `tick`. `history`
    /// bounds how many promoted ids are remembered for `cancel_task`.
    pub fn start<T>(
        target: Arc<T>,
        store: Arc<dyn TaskStore>,
        tick: Duration,
        history: usize,
    ) -> Self
    where
        T: PromotionTarget + ?Sized + 'static,
    {
        let timeline = Arc::new(Timeline::new("scheduled", history));
        let stop = CancellationToken::new();
        let ticker = spawn_ticker(timeline.clone(), target, store, tick, stop.clone());
        info!(tick_ms = tick.as_millis() as u64, "delayed dispatcher started");

        Self {
            timeline,
            stop,
            ticker: Mutex::new(Some(ticker)),
        }
    }

    /// Hold a task until its `scheduled_at`. Scheduling the same id again
    /// replaces the earlier entry.
    pub fn schedule_task(&self, task: Task) {
        let (id, due) = (task.id, task.scheduled_at);
        if self.timeline.insert(id, task, due).is_some() {
            debug!(task_id = %id, scheduled_at = %due, "rescheduled task");
        } else {
            debug!(task_id = %id, scheduled_at = %due, "scheduled task");
        }
    }

    /// Remove a task that has not been promoted yet.
    ///
    /// If the task is being handed to the router right now, waits for that
    /// handover to settle: a refused handover leaves the task here to be
    /// cancelled, an accepted one makes the cancel fail.
    pub async fn cancel_task(&self, id: TaskId) -> EngineResult<Task> {
        let cancelled = self
            .timeline
            .cancel_settled(&id, |task| match task.status {
                TaskStatus::Pending => Ok(()),
                status => Err(format!("status is {status}")),
            })
            .await;

        match cancelled {
            Ok(task) => {
                debug!(task_id = %id, "cancelled scheduled task");
                Ok(task)
            }
            Err(CancelMiss::Absent) => Err(EngineError::TaskNotFound(id)),
            Err(CancelMiss::Promoted | CancelMiss::InFlight) => Err(EngineError::invalid_state(
                id,
                "already handed to a worker pool",
            )),
            Err(CancelMiss::Refused(reason)) => Err(EngineError::invalid_state(id, reason)),
        }
    }

    /// Tasks still waiting for their time.
    pub fn pending_count(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Stop promoting. Tasks already handed over are unaffected; tasks still
    /// waiting stay here.
    pub async fn stop(&self) {
        self.stop.cancel();
        let ticker = lock(&self.ticker).take();
        if let Some(ticker) = ticker {
            if let Err(e) = ticker.await {
                error!(error = %e, "dispatcher ticker failed");
            }
            info!(pending = self.timeline.len(), "delayed dispatcher stopped");
        }
    }
}

impl Drop for DelayedDispatcher {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Rejected;
    use crate::store::InMemoryTaskStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use taskforge_core::Payload;

    #[derive(Default)]
    struct Collect(Mutex<Vec<TaskId>>);

    #[async_trait]
    impl PromotionTarget for Collect {
        async fn promote(&self, task: Task) -> Result<(), Rejected> {
            lock(&self.0).push(task.id);
            Ok(())
        }
    }

    /// Refuses the first handover after a delay, as a full tier would,
    /// then accepts everything.
    #[derive(Default)]
    struct SlowThenFull {
        calls: AtomicU32,
        accepted: Mutex<Vec<TaskId>>,
    }

    #[async_trait]
    impl PromotionTarget for SlowThenFull {
        async fn promote(&self, task: Task) -> Result<(), Rejected> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
                let task_id = task.id;
                return Err(Rejected::new(
                    task,
                    EngineError::QueueFullTimeout {
                        pool: "high".into(),
                        task_id,
                        timeout: Duration::from_millis(200),
                    },
                ));
            }
            lock(&self.accepted).push(task.id);
            Ok(())
        }
    }

    const TICK: Duration = Duration::from_millis(10);

    fn dispatcher(target: Arc<Collect>) -> DelayedDispatcher {
        DelayedDispatcher::start(target, InMemoryTaskStore::arc(), TICK, 16)
    }

    async fn wait_for_promotion(target: &Collect, id: TaskId) {
        for _ in 0..500 {
            if lock(&target.0).contains(&id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("task {id} was never promoted");
    }

    #[tokio::test]
    async fn cancel_before_promotion_returns_the_task() {
        let target = Arc::new(Collect::default());
        let dispatcher = dispatcher(target.clone());
        let task = Task::new("echo", Payload::new()).delayed(Duration::from_secs(60));
        let id = task.id;

        dispatcher.schedule_task(task);
        assert_eq!(dispatcher.pending_count(), 1);

        let cancelled = dispatcher.cancel_task(id).await.unwrap();
        assert_eq!(cancelled.id, id);
        assert_eq!(dispatcher.pending_count(), 0);
        assert_eq!(dispatcher.cancel_task(id).await, Err(EngineError::TaskNotFound(id)));
        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn cancel_after_promotion_is_invalid_state() {
        let target = Arc::new(Collect::default());
        let dispatcher = dispatcher(target.clone());
        let task = Task::new("echo", Payload::new()).delayed(TICK * 2);
        let id = task.id;

        dispatcher.schedule_task(task);
        wait_for_promotion(&target, id).await;

        assert!(matches!(
            dispatcher.cancel_task(id).await,
            Err(EngineError::InvalidState { task_id, .. }) if task_id == id
        ));
        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn cancel_during_refused_handover_wins() {
        let target = Arc::new(SlowThenFull::default());
        let dispatcher =
            DelayedDispatcher::start(target.clone(), InMemoryTaskStore::arc(), TICK, 16);
        let task = Task::new("echo", Payload::new());
        let id = task.id;

        dispatcher.schedule_task(task);
        // The first handover is now stuck behind the full target.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);

        let cancelled = dispatcher.cancel_task(id).await.unwrap();
        assert_eq!(cancelled.id, id);
        assert_eq!(dispatcher.pending_count(), 0);

        tokio::time::sleep(TICK * 5).await;
        assert!(lock(&target.accepted).is_empty());
        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn past_schedule_is_promoted_on_next_tick() {
        let target = Arc::new(Collect::default());
        let dispatcher = dispatcher(target.clone());
        let task = Task::new("echo", Payload::new())
            .scheduled_at(chrono::Utc::now() - chrono::Duration::seconds(30));
        let id = task.id;

        dispatcher.schedule_task(task);
        wait_for_promotion(&target, id).await;
        assert_eq!(dispatcher.pending_count(), 0);
        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn rescheduling_keeps_the_last_write() {
        let target = Arc::new(Collect::default());
        let dispatcher = dispatcher(target.clone());
        let task = Task::new("echo", Payload::new()).delayed(Duration::from_secs(60));
        let id = task.id;

        dispatcher.schedule_task(task.clone());
        dispatcher.schedule_task(task.delayed(Duration::ZERO));
        assert_eq!(dispatcher.pending_count(), 1);

        wait_for_promotion(&target, id).await;
        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn only_pending_tasks_can_be_cancelled() {
        let target = Arc::new(Collect::default());
        let dispatcher = dispatcher(target);
        let mut task = Task::new("echo", Payload::new()).delayed(Duration::from_secs(60));
        task.fail("gave up");
        let id = task.id;

        dispatcher.schedule_task(task);
        assert!(matches!(
            dispatcher.cancel_task(id).await,
            Err(EngineError::InvalidState { .. })
        ));
        assert_eq!(dispatcher.pending_count(), 1);
        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn stop_leaves_waiting_tasks_alone() {
        let target = Arc::new(Collect::default());
        let dispatcher = dispatcher(target.clone());
        dispatcher.stop().await;
        assert!(dispatcher.is_stopped());

        dispatcher.schedule_task(Task::new("echo", Payload::new()));
        tokio::time::sleep(TICK * 3).await;
        assert!(lock(&target.0).is_empty());
        assert_eq!(dispatcher.pending_count(), 1);

        // idempotent
        dispatcher.stop().await;
    }
}
