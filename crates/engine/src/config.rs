//! Engine configuration.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::pool::PoolConfig;
use crate::retry::BackoffPolicy;
use crate::router::{Tier, TierAllocation};

pub const WORKERS_ENV: &str = "TASKFORGE_WORKERS";
pub const QUEUE_CAPACITY_ENV: &str = "TASKFORGE_QUEUE_CAPACITY";
pub const ENQUEUE_TIMEOUT_ENV: &str = "TASKFORGE_ENQUEUE_TIMEOUT_MS";
pub const HANDLER_TIMEOUT_ENV: &str = "TASKFORGE_HANDLER_TIMEOUT_SECS";
pub const TIME_UNIT_ENV: &str = "TASKFORGE_TIME_UNIT_MS";
pub const BACKOFF_UNITS_ENV: &str = "TASKFORGE_BACKOFF_UNITS";
pub const TICK_UNITS_ENV: &str = "TASKFORGE_TICK_UNITS";
pub const PROMOTED_HISTORY_ENV: &str = "TASKFORGE_PROMOTED_HISTORY";

/// Engine-wide settings. Durations are stored as plain integers so the
/// struct maps 1:1 onto env vars and config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Workers across all three tiers, split 50/30/20.
    pub total_workers: usize,
    /// Queue capacity of each tier.
    pub queue_capacity: usize,
    pub enqueue_timeout_ms: u64,
    pub handler_timeout_secs: u64,
    /// Base time unit for backoff and ticking.
    pub time_unit_ms: u64,
    /// Backoff per retry, in time units.
    pub backoff_units: u32,
    /// Promotion tick interval, in time units.
    pub tick_units: u32,
    /// How many promoted ids the dispatcher remembers for cancel requests.
    pub promoted_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            total_workers: 10,
            queue_capacity: 100,
            enqueue_timeout_ms: 5_000,
            handler_timeout_secs: 30 * 60,
            time_unit_ms: 1_000,
            backoff_units: 5,
            tick_units: 1,
            promoted_history: 1024,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by any `TASKFORGE_*` variables that are set.
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, WORKERS_ENV)? {
            config.total_workers = v;
        }
        if let Some(v) = parse_var(&lookup, QUEUE_CAPACITY_ENV)? {
            config.queue_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, ENQUEUE_TIMEOUT_ENV)? {
            config.enqueue_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, HANDLER_TIMEOUT_ENV)? {
            config.handler_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, TIME_UNIT_ENV)? {
            config.time_unit_ms = v;
        }
        if let Some(v) = parse_var(&lookup, BACKOFF_UNITS_ENV)? {
            config.backoff_units = v;
        }
        if let Some(v) = parse_var(&lookup, TICK_UNITS_ENV)? {
            config.tick_units = v;
        }
        if let Some(v) = parse_var(&lookup, PROMOTED_HISTORY_ENV)? {
            config.promoted_history = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_total_workers(mut self, workers: usize) -> Self {
        self.total_workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_time_unit(mut self, unit: Duration) -> Self {
        self.time_unit_ms = unit.as_millis() as u64;
        self
    }

    pub fn with_backoff_units(mut self, units: u32) -> Self {
        self.backoff_units = units;
        self
    }

    pub fn with_tick_units(mut self, units: u32) -> Self {
        self.tick_units = units;
        self
    }

    pub fn with_promoted_history(mut self, history: usize) -> Self {
        self.promoted_history = history;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        let allocation = TierAllocation::split(self.total_workers);
        for tier in Tier::ALL {
            if allocation.workers(tier) == 0 {
                return Err(EngineError::invalid_config(format!(
                    "{} workers leave the {tier} tier with none (need at least 4)",
                    self.total_workers
                )));
            }
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::invalid_config("queue_capacity must be > 0"));
        }
        if self.time_unit_ms == 0 {
            return Err(EngineError::invalid_config("time_unit_ms must be > 0"));
        }
        if self.tick_units == 0 {
            return Err(EngineError::invalid_config("tick_units must be > 0"));
        }
        if self.handler_timeout_secs == 0 {
            return Err(EngineError::invalid_config("handler_timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn time_unit(&self) -> Duration {
        Duration::from_millis(self.time_unit_ms)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        self.time_unit() * self.tick_units
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::linear(self.time_unit(), self.backoff_units)
    }

    /// Pool settings for one tier.
    pub fn pool_config(&self, tier: Tier) -> PoolConfig {
        PoolConfig::default()
            .with_name(tier.as_str())
            .with_workers(TierAllocation::split(self.total_workers).workers(tier))
            .with_capacity(self.queue_capacity)
            .with_enqueue_timeout(self.enqueue_timeout())
            .with_handler_timeout(self.handler_timeout())
            .with_backoff(self.backoff())
            .with_retry_tick(self.tick_interval())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> EngineResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key).filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e| EngineError::invalid_config(format!("{key}={raw:?}: {e}")))
}
