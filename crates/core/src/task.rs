//! The task record and its lifecycle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{TaskId, TenantId};

/// Schema-less key/value payload carried in and out of handlers.
///
/// The engine never looks inside it.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Retries granted to a task unless the submitter says otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// `delay` from now, saturating at the latest representable instant.
pub fn due_in(delay: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Task execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in a queue, on the dispatcher, or for a retry.
    Pending,
    /// Held by a worker and running through its handler.
    Processing,
    /// Handler succeeded; `result` is set.
    Completed,
    /// Retries exhausted or no handler registered; `error` is set.
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to pending; `retry` is the (already incremented) retry count.
    Retry { retry: u32 },
    /// Retry budget used up; the task is now `Failed`.
    Exhausted,
}

/// A unit of submitted work plus its mutable execution state.
///
/// A task is owned by exactly one component at a time (dispatcher, router,
/// pool, worker). Every engine API takes it by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Key into the handler registry.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Higher is more urgent. Fixes the tier at first enqueue.
    pub priority: i32,
    #[serde(default)]
    pub payload: Payload,
    pub status: TaskStatus,
    /// Only consulted by the delayed dispatcher.
    pub scheduled_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// 0-100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task due immediately, with a fresh id and priority 0.
    pub fn new(task_type: impl Into<String>, payload: Payload) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            priority: 0,
            payload,
            status: TaskStatus::Pending,
            scheduled_at: now,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            progress: 0,
            result: None,
            error: None,
            tenant_id: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Defer execution until `at`.
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = at;
        self
    }

    /// Defer execution by `delay` from now.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.scheduled_at = due_in(delay);
        self
    }

    /// Check the record is fit for submission.
    pub fn validate(&self) -> DomainResult<()> {
        if self.task_type.trim().is_empty() {
            return Err(DomainError::validation("task type must not be empty"));
        }
        if self.retry_count > self.max_retries {
            return Err(DomainError::invariant(format!(
                "retry count {} exceeds max retries {}",
                self.retry_count, self.max_retries
            )));
        }
        if self.progress > 100 {
            return Err(DomainError::validation("progress must be within 0-100"));
        }
        Ok(())
    }

    /// Whether the dispatcher may promote this task at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// pending -> processing.
    pub fn begin_attempt(&mut self) {
        let now = Utc::now();
        self.status = TaskStatus::Processing;
        self.started_at = Some(now);
        self.completed_at = None;
        self.progress = 0;
        self.updated_at = now;
    }

    /// processing -> completed.
    pub fn complete(&mut self, result: Payload) {
        let now = Utc::now();
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.progress = 100;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// processing -> pending (retry budget left) or processing -> failed.
    ///
    /// The retry count is bumped before the caller computes the backoff, so
    /// the first retry reports `retry: 1`.
    pub fn record_failure(&mut self, error: impl Into<String>) -> FailureOutcome {
        let error = error.into();
        if self.can_retry() {
            self.retry_count += 1;
            self.status = TaskStatus::Pending;
            self.error = Some(error);
            self.started_at = None;
            self.completed_at = None;
            self.updated_at = Utc::now();
            FailureOutcome::Retry {
                retry: self.retry_count,
            }
        } else {
            self.fail(error);
            FailureOutcome::Exhausted
        }
    }

    /// Straight to failed, without touching the retry count.
    pub fn fail(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
        self.updated_at = Utc::now();
    }
}
