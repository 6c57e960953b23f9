//! Task handlers and the type -> handler registry.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taskforge_core::{Payload, Task};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome of one handler invocation.
pub type HandlerResult = Result<Payload, HandlerError>;

/// Error returned by a handler. Every variant is an ordinary, retryable
/// failure from the pool's point of view.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("execution exceeded {0:?}")]
    TimedOut(Duration),

    #[error("execution cancelled")]
    Cancelled,
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        Self::Failed(msg)
    }
}

impl From<&str> for HandlerError {
    fn from(msg: &str) -> Self {
        Self::Failed(msg.to_string())
    }
}

/// What a handler gets for one attempt.
///
/// The task is a snapshot: the worker owns the real record and applies the
/// outcome to it. The cancellation token fires when the attempt deadline
/// passes or the pool shuts down. Observing it is up to the handler.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task: Task,
    cancellation: CancellationToken,
    deadline: Instant,
    limit: Duration,
}

impl TaskContext {
    pub fn new(task: Task, cancellation: CancellationToken, limit: Duration) -> Self {
        Self {
            task,
            cancellation,
            deadline: Instant::now() + limit,
            limit,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn payload(&self) -> &Payload {
        &self.task.payload
    }

    /// 1 for the first run, 2 for the first retry, and so on.
    pub fn attempt(&self) -> u32 {
        self.task.retry_count + 1
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// The error to report once the token has fired.
    pub fn interruption(&self) -> HandlerError {
        if Instant::now() >= self.deadline {
            HandlerError::TimedOut(self.limit)
        } else {
            HandlerError::Cancelled
        }
    }

    /// Drive `fut` until it finishes or the attempt is cancelled.
    pub async fn run_until_cancelled<F, T>(&self, fut: F) -> Result<T, HandlerError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(self.interruption()),
            out = fut => Ok(out),
        }
    }
}

/// Executes tasks of one type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: TaskContext) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> TaskHandler for F
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: TaskContext) -> HandlerResult {
        (self)(ctx).await
    }
}

/// Maps task types to handlers.
///
/// Built once during setup, then shared read-only by every pool.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a task type. A later registration for the same
    /// type replaces the earlier one.
    ///
    /// `"category.*"` matches every type in that category and `"*"` matches
    /// anything; exact registrations always take precedence.
    pub fn register<H>(&mut self, task_type: impl Into<String>, handler: H) -> &mut Self
    where
        H: TaskHandler + 'static,
    {
        self.register_shared(task_type, Arc::new(handler))
    }

    pub fn register_shared(
        &mut self,
        task_type: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> &mut Self {
        let task_type = task_type.into();
        if self.handlers.insert(task_type.clone(), handler).is_some() {
            tracing::debug!(task_type = %task_type, "handler replaced");
        }
        self
    }

    /// Resolve the handler for a task type.
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        if let Some(h) = self.handlers.get(task_type) {
            return Some(h.clone());
        }

        // Category match: "ai.*" matches "ai.summarize"; the longest prefix wins.
        let category = self
            .handlers
            .iter()
            .filter_map(|(pattern, h)| {
                let prefix = pattern.strip_suffix(".*")?;
                let rest = task_type.strip_prefix(prefix)?;
                rest.starts_with('.').then_some((prefix.len(), h))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, h)| h.clone());
        if category.is_some() {
            return category;
        }

        self.handlers.get("*").cloned()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.get(task_type).is_some()
    }

    /// Registered patterns, sorted.
    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}
