//! Priority-tiered async task engine.
//!
//! Tasks are routed by priority to one of three bounded worker pools,
//! executed through a type-keyed [`HandlerRegistry`], retried with linear
//! backoff, and optionally held by the [`DelayedDispatcher`] until their
//! scheduled time. [`TaskEngine`] wires the pieces together.

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handler;
pub mod pool;
pub mod retry;
pub mod router;
pub mod store;
pub mod timeline;

pub use config::EngineConfig;
pub use dispatcher::DelayedDispatcher;
pub use engine::{Submission, TaskEngine};
pub use error::{EngineError, EngineResult, Rejected};
pub use handler::{HandlerError, HandlerRegistry, HandlerResult, TaskContext, TaskHandler};
pub use pool::{PoolConfig, PoolStats, WorkerPool};
pub use retry::BackoffPolicy;
pub use router::{PriorityRouter, QueueStats, Tier, TierAllocation};
pub use store::{InMemoryTaskStore, NoopTaskStore, TaskStats, TaskStore, TaskStoreError};
pub use timeline::{PromotionTarget, Timeline};

pub use taskforge_core::{Payload, Task, TaskId, TaskStatus};
