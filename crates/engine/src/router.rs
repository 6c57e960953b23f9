//! Priority routing across three worker pools.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskforge_core::Task;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{EngineResult, Rejected};
use crate::handler::HandlerRegistry;
use crate::pool::{PoolStats, WorkerPool};
use crate::store::TaskStore;
use crate::timeline::PromotionTarget;

/// Priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    High,
    Normal,
    Low,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::High, Tier::Normal, Tier::Low];

    /// Lowest priority routed to the high tier.
    pub const HIGH_FROM: i32 = 7;
    /// Lowest priority routed to the normal tier.
    pub const NORMAL_FROM: i32 = 4;

    pub fn for_priority(priority: i32) -> Self {
        if priority >= Self::HIGH_FROM {
            Tier::High
        } else if priority >= Self::NORMAL_FROM {
            Tier::Normal
        } else {
            Tier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::High => "high",
            Tier::Normal => "normal",
            Tier::Low => "low",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workers per tier: half to high, 30% to normal, the remainder to low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierAllocation {
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl TierAllocation {
    pub fn split(total: usize) -> Self {
        let high = total * 5 / 10;
        let normal = total * 3 / 10;
        Self {
            high,
            normal,
            low: total - high - normal,
        }
    }

    pub fn workers(&self, tier: Tier) -> usize {
        match tier {
            Tier::High => self.high,
            Tier::Normal => self.normal,
            Tier::Low => self.low,
        }
    }

    pub fn total(&self) -> usize {
        self.high + self.normal + self.low
    }
}

/// Queue depth per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl QueueStats {
    pub fn depth(&self, tier: Tier) -> usize {
        match tier {
            Tier::High => self.high,
            Tier::Normal => self.normal,
            Tier::Low => self.low,
        }
    }

    pub fn total(&self) -> usize {
        self.high + self.normal + self.low
    }
}

/// Sends each task to the pool of its priority tier.
pub struct PriorityRouter {
    allocation: TierAllocation,
    high: WorkerPool,
    normal: WorkerPool,
    low: WorkerPool,
}

impl PriorityRouter {
    /// Start all three pools with one shared registry. Must be called
    /// inside a Tokio runtime.
    pub fn start(
        config: &EngineConfig,
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn TaskStore>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let allocation = TierAllocation::split(config.total_workers);

        let pool =
            |tier| WorkerPool::start(config.pool_config(tier), registry.clone(), store.clone());
        let router = Self {
            allocation,
            high: pool(Tier::High)?,
            normal: pool(Tier::Normal)?,
            low: pool(Tier::Low)?,
        };

        info!(
            high = allocation.high,
            normal = allocation.normal,
            low = allocation.low,
            capacity = config.queue_capacity,
            "priority router started"
        );
        Ok(router)
    }

    pub fn pool(&self, tier: Tier) -> &WorkerPool {
        match tier {
            Tier::High => &self.high,
            Tier::Normal => &self.normal,
            Tier::Low => &self.low,
        }
    }

    pub fn allocation(&self) -> TierAllocation {
        self.allocation
    }

    /// Route by priority and enqueue on that tier's pool.
    pub async fn enqueue(&self, task: Task) -> Result<Tier, Rejected> {
        let tier = Tier::for_priority(task.priority);
        debug!(task_id = %task.id, priority = task.priority, tier = %tier, "routing task");
        self.pool(tier).enqueue(task).await?;
        Ok(tier)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            high: self.high.queue_size(),
            normal: self.normal.queue_size(),
            low: self.low.queue_size(),
        }
    }

    pub fn pool_stats(&self, tier: Tier) -> PoolStats {
        self.pool(tier).stats()
    }

    pub fn queue_size(&self) -> usize {
        self.stats().total()
    }

    /// Shut all tiers down concurrently.
    pub async fn shutdown(&self) {
        tokio::join!(self.high.shutdown(), self.normal.shutdown(), self.low.shutdown());
        info!("priority router stopped");
    }
}

#[async_trait]
impl PromotionTarget for PriorityRouter {
    async fn promote(&self, task: Task) -> Result<(), Rejected> {
        self.enqueue(task).await.map(|_| ())
    }
}
