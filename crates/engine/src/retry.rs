//! Retry backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Linear backoff: the n-th retry waits `n * units_per_retry` time units.
///
/// No jitter and no cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub time_unit: Duration,
    pub units_per_retry: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            time_unit: Duration::from_secs(1),
            units_per_retry: 5,
        }
    }
}

impl BackoffPolicy {
    pub fn linear(time_unit: Duration, units_per_retry: u32) -> Self {
        Self {
            time_unit,
            units_per_retry,
        }
    }

    /// Delay before the given retry (1-based; the count is bumped before
    /// this is asked).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let units = self.units_per_retry.saturating_mul(retry);
        self.time_unit.checked_mul(units).unwrap_or(Duration::MAX)
    }
}
