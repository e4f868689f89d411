use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use crate::limiter::ConsumeStrategy;

const REFILL_UNIT_MS: u64 = 1_000;

/// Token bucket for a single client.
///
/// Both fields are independently atomic. The refill timestamp only moves via a
/// compare-and-swap, so at most one caller adds tokens for a given interval.
#[derive(Debug)]
pub(crate) struct Bucket {
    capacity: u64,
    refill_rate: u64,
    tokens: AtomicU64,
    last_refill_ms: AtomicU64,
}

impl Bucket {
    /// Starts full.
    pub(crate) fn new(capacity: u64, refill_rate: u64, now_ms: u64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: AtomicU64::new(capacity),
            last_refill_ms: AtomicU64::new(now_ms),
        }
    }

    /// Adds `floor(elapsed_secs) * refill_rate` tokens, capped at capacity.
    /// Returns the number of tokens this caller added (0 if it lost the race
    /// or less than a whole second has passed). The sub-second remainder is dropped.
    pub(crate) fn refill(&self, now_ms: u64) -> u64 {
        let last = self.last_refill_ms.load(Ordering::Acquire);
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < REFILL_UNIT_MS {
            return 0;
        }

        if self
            .last_refill_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return 0;
        }

        let to_add = (elapsed / REFILL_UNIT_MS).saturating_mul(self.refill_rate);
        // fetch_update so a concurrent consume between read and write is not lost
        let _ = self
            .tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(to_add).min(self.capacity))
            });

        trace!("Refilled {} tokens after {}ms", to_add, elapsed);
        to_add
    }

    /// Refills, then tries to take one token.
    pub(crate) fn try_consume(&self, now_ms: u64, strategy: ConsumeStrategy) -> bool {
        self.refill(now_ms);

        let current = self.tokens.load(Ordering::Acquire);
        if current == 0 {
            return false;
        }

        match strategy {
            ConsumeStrategy::SingleShot => self
                .tokens
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
            ConsumeStrategy::Retry => self
                .tokens
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| t.checked_sub(1))
                .is_ok(),
        }
    }

    pub(crate) fn tokens(&self) -> u64 {
        self.tokens.load(Ordering::Acquire)
    }
}
