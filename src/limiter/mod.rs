pub mod bucket;
pub mod token_bucket;

use serde::Deserialize;

use crate::error::{LimiterError, Result};

pub use token_bucket::TokenBucketLimiter;

/// Admission contract consumed by a request-handling layer.
pub trait RateLimiter: Send + Sync {
    /// Returns `Ok(true)` if the request from `client_id` is admitted.
    /// Denial is `Ok(false)`; only an empty id is an error.
    fn try_acquire(&self, client_id: &str) -> Result<bool>;
}

/// How a bucket reacts when its decrement loses a compare-and-swap race.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsumeStrategy {
    /// One attempt. A lost race is a denial, even if tokens remain.
    #[default]
    SingleShot,
    /// Repeat the compare-and-swap while tokens remain.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    pub capacity: i64,
    pub refill_rate: i64,
    pub strategy: ConsumeStrategy,
}

impl LimiterConfig {
    pub fn new(capacity: i64, refill_rate: i64) -> Self {
        Self {
            capacity,
            refill_rate,
            strategy: ConsumeStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: ConsumeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity <= 0 || self.refill_rate <= 0 {
            return Err(LimiterError::InvalidConfiguration(format!(
                "Capacity and refill rate must be positive (capacity: {}, refill rate: {})",
                self.capacity, self.refill_rate
            )));
        }
        Ok(())
    }
}
