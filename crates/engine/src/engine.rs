//! Engine facade: router plus dispatcher behind one handle.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use taskforge_core::{Task, TaskId};
use tracing::info;

use crate::config::EngineConfig;
use crate::dispatcher::DelayedDispatcher;
use crate::error::{EngineResult, Rejected};
use crate::handler::HandlerRegistry;
use crate::pool::PoolStats;
use crate::router::{PriorityRouter, QueueStats, Tier};
use crate::store::TaskStore;

/// Where a submitted task went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Submission {
    Queued(Tier),
    Scheduled,
}

pub struct TaskEngine {
    config: EngineConfig,
    registry: Arc<HandlerRegistry>,
    router: Arc<PriorityRouter>,
    dispatcher: DelayedDispatcher,
}

impl TaskEngine {
    /// Start the three tier pools and the dispatcher. Must be called inside
    /// a Tokio runtime.
    pub fn start(
        config: EngineConfig,
        registry: HandlerRegistry,
        store: Arc<dyn TaskStore>,
    ) -> EngineResult<Self> {
        let registry = registry.into_shared();
        let router = Arc::new(PriorityRouter::start(&config, registry.clone(), store.clone())?);
        let dispatcher = DelayedDispatcher::start(
            router.clone(),
            store,
            config.tick_interval(),
            config.promoted_history,
        );

        info!(
            workers = config.total_workers,
            handlers = registry.len(),
            "task engine started"
        );
        Ok(Self {
            config,
            registry,
            router,
            dispatcher,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn router(&self) -> &PriorityRouter {
        &self.router
    }

    pub fn dispatcher(&self) -> &DelayedDispatcher {
        &self.dispatcher
    }

    /// Route straight to a tier, ignoring `scheduled_at`.
    pub async fn enqueue(&self, task: Task) -> Result<Tier, Rejected> {
        self.router.enqueue(task).await
    }

    /// Hold until `scheduled_at`, then route.
    pub fn schedule_task(&self, task: Task) {
        self.dispatcher.schedule_task(task);
    }

    /// Schedule if `scheduled_at` is in the future, enqueue otherwise.
    pub async fn submit(&self, task: Task) -> Result<Submission, Rejected> {
        if task.is_due(Utc::now()) {
            self.enqueue(task).await.map(Submission::Queued)
        } else {
            self.schedule_task(task);
            Ok(Submission::Scheduled)
        }
    }

    pub async fn cancel_task(&self, id: TaskId) -> EngineResult<Task> {
        self.dispatcher.cancel_task(id).await
    }

    pub fn stats(&self) -> QueueStats {
        self.router.stats()
    }

    pub fn pool_stats(&self, tier: Tier) -> PoolStats {
        self.router.pool_stats(tier)
    }

    pub fn queue_size(&self) -> usize {
        self.router.queue_size()
    }

    pub fn scheduled_count(&self) -> usize {
        self.dispatcher.pending_count()
    }

    /// Stop the dispatcher, then drain the router.
    pub async fn shutdown(&self) {
        self.dispatcher.stop().await;
        self.router.shutdown().await;
        info!("task engine stopped");
    }
}
