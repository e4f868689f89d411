use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::analytics::stats::{LimiterStats, StatsSnapshot};
use crate::error::{LimiterError, Result};
use crate::limiter::bucket::Bucket;
use crate::limiter::{ConsumeStrategy, LimiterConfig, RateLimiter};
use crate::utils::time::{Clock, MonotonicClock};

/// Per-client token bucket limiter.
///
/// Every distinct client id gets its own bucket, created on first `try_acquire`
/// and kept for the lifetime of the limiter. Refill happens lazily on access;
/// there is no background task.
pub struct TokenBucketLimiter<C: Clock = MonotonicClock> {
    capacity: u64,
    refill_rate: u64,
    strategy: ConsumeStrategy,
    buckets: DashMap<String, Arc<Bucket>>,
    clock: C,
    stats: LimiterStats,
}

impl TokenBucketLimiter<MonotonicClock> {
    pub fn new(capacity: i64, refill_rate: i64) -> Result<Self> {
        Self::from_config(LimiterConfig::new(capacity, refill_rate))
    }

    pub fn from_config(config: LimiterConfig) -> Result<Self> {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<C: Clock> TokenBucketLimiter<C> {
    pub fn with_clock(config: LimiterConfig, clock: C) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            capacity: config.capacity as u64,
            refill_rate: config.refill_rate as u64,
            strategy: config.strategy,
            buckets: DashMap::new(),
            clock,
            stats: LimiterStats::new(),
        })
    }

    pub fn try_acquire(&self, client_id: &str) -> Result<bool> {
        if client_id.is_empty() {
            return Err(LimiterError::InvalidArgument(
                "Client ID cannot be empty".to_string(),
            ));
        }

        let bucket = self.bucket_for(client_id);
        let admitted = bucket.try_consume(self.clock.now_ms(), self.strategy);
        self.stats.record(admitted);

        if !admitted {
            trace!("Denied request for client {}", client_id);
        }
        Ok(admitted)
    }

    /// Tokens currently available to `client_id`, brought up to date.
    /// Unknown clients report 0 and no bucket is created.
    pub fn current_tokens(&self, client_id: &str) -> u64 {
        match self.buckets.get(client_id) {
            Some(bucket) => {
                bucket.refill(self.clock.now_ms());
                bucket.tokens()
            }
            None => 0,
        }
    }

    pub fn client_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> u64 {
        self.refill_rate
    }

    pub fn strategy(&self) -> ConsumeStrategy {
        self.strategy
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn log_stats(&self) {
        self.stats.log_stats();
    }

    fn bucket_for(&self, client_id: &str) -> Arc<Bucket> {
        // Fast path avoids allocating the key
        if let Some(bucket) = self.buckets.get(client_id) {
            return bucket.clone();
        }

        match self.buckets.entry(client_id.to_string()) {
            Entry::Occupied(o) => o.get().clone(),
            Entry::Vacant(v) => {
                let bucket = Arc::new(Bucket::new(
                    self.capacity,
                    self.refill_rate,
                    self.clock.now_ms(),
                ));
                v.insert(bucket.clone());
                self.stats.inc_buckets_created();
                debug!("Created bucket for client {}", client_id);
                bucket
            }
        }
    }
}

impl<C: Clock> RateLimiter for TokenBucketLimiter<C> {
    fn try_acquire(&self, client_id: &str) -> Result<bool> {
        TokenBucketLimiter::try_acquire(self, client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::ManualClock;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn manual_limiter(
        capacity: i64,
        refill_rate: i64,
        strategy: ConsumeStrategy,
    ) -> (Arc<TokenBucketLimiter<Arc<ManualClock>>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let config = LimiterConfig::new(capacity, refill_rate).with_strategy(strategy);
        let limiter = TokenBucketLimiter::with_clock(config, clock.clone()).unwrap();
        (Arc::new(limiter), clock)
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        assert!(matches!(
            TokenBucketLimiter::new(0, 10),
            Err(LimiterError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            TokenBucketLimiter::new(10, -1),
            Err(LimiterError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            TokenBucketLimiter::new(-5, 0),
            Err(LimiterError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_empty_client_id() {
        let limiter = TokenBucketLimiter::new(10, 10).unwrap();
        assert!(matches!(
            limiter.try_acquire(""),
            Err(LimiterError::InvalidArgument(_))
        ));
        assert_eq!(limiter.client_count(), 0);
        assert_eq!(limiter.stats(), StatsSnapshot::default());
    }

    #[test]
    fn test_initial_burst() {
        let limiter = TokenBucketLimiter::new(5, 1).unwrap();

        for _ in 0..5 {
            assert!(limiter.try_acquire("user-123").unwrap());
        }
        assert!(!limiter.try_acquire("user-123").unwrap());
        assert_eq!(limiter.current_tokens("user-123"), 0);

        let stats = limiter.stats();
        assert_eq!(stats.admitted, 5);
        assert_eq!(stats.denied, 1);
        assert_eq!(stats.buckets_created, 1);
    }

    #[test]
    fn test_refill_after_one_second() {
        let limiter = TokenBucketLimiter::new(10, 10).unwrap();

        for _ in 0..10 {
            assert!(limiter.try_acquire("user-123").unwrap());
        }
        assert!(!limiter.try_acquire("user-123").unwrap());

        // Wait 1.1s
        thread::sleep(Duration::from_millis(1100));
        assert_eq!(limiter.current_tokens("user-123"), 10);
        assert!(limiter.try_acquire("user-123").unwrap());
        assert_eq!(limiter.current_tokens("user-123"), 9);
    }

    #[test]
    fn test_refill_is_capped_with_manual_clock() {
        let (limiter, clock) = manual_limiter(10, 3, ConsumeStrategy::SingleShot);

        for _ in 0..10 {
            limiter.try_acquire("a").unwrap();
        }
        assert_eq!(limiter.current_tokens("a"), 0);

        clock.advance_ms(1_000);
        assert_eq!(limiter.current_tokens("a"), 3);

        clock.advance_ms(2_500);
        assert_eq!(limiter.current_tokens("a"), 9);

        clock.advance_ms(10_000);
        assert_eq!(limiter.current_tokens("a"), 10);
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = TokenBucketLimiter::new(3, 1).unwrap();

        for _ in 0..3 {
            assert!(limiter.try_acquire("user-123").unwrap());
        }
        assert!(!limiter.try_acquire("user-123").unwrap());

        assert!(limiter.try_acquire("service-abc").unwrap());
        assert_eq!(limiter.current_tokens("service-abc"), 2);
        assert_eq!(limiter.current_tokens("user-123"), 0);
        assert_eq!(limiter.client_count(), 2);
    }

    #[test]
    fn test_inspection_does_not_create_or_consume() {
        let (limiter, clock) = manual_limiter(4, 1, ConsumeStrategy::SingleShot);

        assert_eq!(limiter.current_tokens("ghost"), 0);
        assert_eq!(limiter.client_count(), 0);

        for _ in 0..4 {
            limiter.try_acquire("a").unwrap();
        }

        let mut previous = 0;
        for _ in 0..6 {
            let tokens = limiter.current_tokens("a");
            assert!(tokens >= previous);
            assert!(tokens <= 4);
            assert_eq!(limiter.current_tokens("a"), tokens);
            previous = tokens;
            clock.advance_ms(1_000);
        }
        assert_eq!(previous, 4);
        assert_eq!(limiter.stats().admitted, 4);
    }

    #[test]
    fn test_concurrent_first_access_creates_one_bucket() {
        let (limiter, _clock) = manual_limiter(1_000, 1, ConsumeStrategy::Retry);
        let barrier = Arc::new(Barrier::new(16));
        let mut handles = vec![];

        for _ in 0..16 {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                limiter.try_acquire("shared").unwrap()
            }));
        }

        for h in handles {
            assert!(h.join().unwrap());
        }

        assert_eq!(limiter.client_count(), 1);
        assert_eq!(limiter.stats().buckets_created, 1);
        assert_eq!(limiter.current_tokens("shared"), 984);
    }

    #[test]
    fn test_concurrent_single_shot_never_overgrants() {
        let (limiter, _clock) = manual_limiter(20, 1, ConsumeStrategy::SingleShot);
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = vec![];

        for _ in 0..8 {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                (0..10)
                    .filter(|_| limiter.try_acquire("burst").unwrap())
                    .count() as u64
            }));
        }

        let granted: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(granted <= 20);
        assert_eq!(granted + limiter.current_tokens("burst"), 20);
    }

    #[test]
    fn test_concurrent_retry_grants_exactly_capacity() {
        let (limiter, _clock) = manual_limiter(20, 1, ConsumeStrategy::Retry);
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = vec![];

        for _ in 0..8 {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                (0..10)
                    .filter(|_| limiter.try_acquire("burst").unwrap())
                    .count() as u64
            }));
        }

        let granted: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 20);
        assert_eq!(limiter.current_tokens("burst"), 0);
        assert_eq!(limiter.stats().denied, 60);
    }

    #[test]
    fn test_usable_as_trait_object() {
        let limiter: Box<dyn RateLimiter> = Box::new(TokenBucketLimiter::new(1, 1).unwrap());
        assert!(limiter.try_acquire("user-123").unwrap());
        assert!(!limiter.try_acquire("user-123").unwrap());
        assert!(limiter.try_acquire("").is_err());
    }
}
