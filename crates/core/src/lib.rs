//! `taskforge-core`: the task model shared by the engine and its callers.
//!
//! This crate contains **pure domain** types (no queues, no runtime).

pub mod error;
pub mod id;
pub mod task;

pub use error::{DomainError, DomainResult};
pub use id::{TaskId, TenantId};
pub use task::{DEFAULT_MAX_RETRIES, FailureOutcome, Payload, Task, TaskStatus, due_in};
