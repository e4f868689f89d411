use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct LimiterStats {
    pub admitted: AtomicU64,
    pub denied: AtomicU64,
    pub buckets_created: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub admitted: u64,
    pub denied: u64,
    pub buckets_created: u64,
}

impl LimiterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, admitted: bool) {
        if admitted {
            self.admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_buckets_created(&self) {
        self.buckets_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            buckets_created: self.buckets_created.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let s = self.snapshot();
        info!(
            "STATS: Admitted: {} | Denied: {} | Clients: {}",
            s.admitted, s.denied, s.buckets_created
        );
    }
}
