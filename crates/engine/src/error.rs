//! Engine error model.

use std::time::Duration;

use taskforge_core::{DomainError, Task, TaskId};
use thiserror::Error;

use crate::handler::HandlerError;

/// Result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level error.
///
/// Queue-level failures (`QueueFullTimeout`, `PoolClosed`) go back to the
/// submitter. Handler-level failures are recorded on the task instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Backpressure: the target queue stayed full for the whole timeout.
    #[error("queue `{pool}` stayed full for {timeout:?}; task {task_id} not enqueued")]
    QueueFullTimeout {
        pool: String,
        task_id: TaskId,
        timeout: Duration,
    },

    /// The target pool has been shut down.
    #[error("worker pool `{pool}` is shut down")]
    PoolClosed { pool: String },

    /// Configuration error: nothing can run tasks of this type.
    #[error("no handler registered for task type: {task_type}")]
    NoHandlerRegistered { task_type: String },

    /// Runtime failure inside a handler.
    #[error("handler failed: {0}")]
    HandlerExecution(String),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The task is not in a state that allows the requested operation.
    #[error("task {task_id} in invalid state: {reason}")]
    InvalidState { task_id: TaskId, reason: String },

    #[error("invalid task: {0}")]
    InvalidTask(#[from] DomainError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub fn invalid_state(task_id: TaskId, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            task_id,
            reason: reason.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Transient: the same submission may succeed later.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, EngineError::QueueFullTimeout { .. })
    }
}

impl From<HandlerError> for EngineError {
    fn from(err: HandlerError) -> Self {
        Self::HandlerExecution(err.to_string())
    }
}

/// A submission the engine refused, with the task handed back.
///
/// Nothing is ever dropped on the floor: the caller gets the task back and
/// decides whether to retry, shed or park it.
#[derive(Debug, Error)]
#[error("task {} rejected: {error}", .task.id)]
pub struct Rejected {
    pub task: Box<Task>,
    #[source]
    pub error: EngineError,
}

impl Rejected {
    pub fn new(task: Task, error: EngineError) -> Self {
        Self {
            task: Box::new(task),
            error,
        }
    }

    pub fn into_task(self) -> Task {
        *self.task
    }
}

impl From<Rejected> for EngineError {
    fn from(rejected: Rejected) -> Self {
        rejected.error
    }
}
