//! Task store seam.
//!
//! The engine keeps no records of its own. Every state transition is handed
//! to a [`TaskStore`] so callers can see progress and read results.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use taskforge_core::{Task, TaskId, TaskStatus, TenantId};
use tokio::sync::Notify;

/// Receives task snapshots on every transition.
pub trait TaskStore: Send + Sync {
    /// Record the latest state of a task (upsert).
    fn update(&self, task: &Task) -> Result<(), TaskStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Task counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct TaskStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Store for callers that do not track tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTaskStore;

impl TaskStore for NoopTaskStore {
    fn update(&self, _task: &Task) -> Result<(), TaskStoreError> {
        Ok(())
    }
}

/// In-memory task store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    changed: Notify,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        tasks.get(&id).cloned()
    }

    /// Drop a record once the caller has read its outcome.
    pub fn remove(&self, id: TaskId) -> Option<Task> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        tasks.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks in the given status, oldest first. `tenant` narrows to one
    /// tenant's tasks.
    pub fn list_by_status(
        &self,
        tenant: Option<TenantId>,
        status: TaskStatus,
        limit: usize,
    ) -> Vec<Task> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        let mut result: Vec<_> = tasks
            .values()
            .filter(|t| t.status == status)
            .filter(|t| tenant.is_none() || t.tenant_id == tenant)
            .cloned()
            .collect();
        result.sort_by_key(|t| t.created_at);
        result.truncate(limit);
        result
    }

    pub fn stats(&self) -> TaskStats {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        let mut stats = TaskStats::default();
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Wait until the task reaches completed or failed. `None` on timeout.
    pub async fn wait_for_terminal(&self, id: TaskId, timeout: Duration) -> Option<Task> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before checking so an update in between is not missed.
            notified.as_mut().enable();

            if let Some(task) = self.get(id).filter(|t| t.status.is_terminal()) {
                return Some(task);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }
}

impl TaskStore for InMemoryTaskStore {
    fn update(&self, task: &Task) -> Result<(), TaskStoreError> {
        {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            tasks.insert(task.id, task.clone());
        }
        self.changed.notify_waiters();
        Ok(())
    }
}
