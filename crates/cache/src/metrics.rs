//! Key cache metrics.
//!
//! Counters are plain `AtomicU64`s updated with `Ordering::Relaxed`. Each
//! counter is independent and monotonically increasing, so a snapshot may
//! observe one counter slightly ahead of another. That is acceptable for
//! telemetry.
//!
//! # Usage
//!
//! ```
//! use rotakey_cache::metrics::CacheMetrics;
//!
//! let metrics = CacheMetrics::new();
//! metrics.record_hit();
//! metrics.record_miss();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.hits, 1);
//! assert_eq!(snapshot.hit_rate(), 0.5);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters describing cache behaviour.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    fetch_errors: AtomicU64,
    scheduled_refreshes: AtomicU64,
    joined_refreshes: AtomicU64,
}

impl CacheMetrics {
    /// Creates a zeroed metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a lookup served from the current snapshot.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup that required a refresh.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a call to the fetcher.
    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a refresh that did not install a snapshot.
    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a refresh requested by the background scheduler.
    pub fn record_scheduled_refresh(&self) {
        self.scheduled_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a refresh request satisfied by an already in-flight fetch.
    pub fn record_joined_refresh(&self) {
        self.joined_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            scheduled_refreshes: self.scheduled_refreshes.load(Ordering::Relaxed),
            joined_refreshes: self.joined_refreshes.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot for export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bon::Builder)]
pub struct CacheMetricsSnapshot {
    /// Lookups served without a refresh.
    #[builder(default)]
    pub hits: u64,
    /// Lookups that triggered or joined a refresh.
    #[builder(default)]
    pub misses: u64,
    /// Calls made to the fetcher, including the construction fetch.
    #[builder(default)]
    pub fetches: u64,
    /// Refreshes that failed.
    #[builder(default)]
    pub fetch_errors: u64,
    /// Refreshes requested by the background scheduler.
    #[builder(default)]
    pub scheduled_refreshes: u64,
    /// Refresh requests that attached to an in-flight fetch.
    #[builder(default)]
    pub joined_refreshes: u64,
}

impl CacheMetricsSnapshot {
    /// Returns the cache hit rate (0.0 - 1.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = CacheMetrics::new();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_fetch();
        metrics.record_fetch_error();
        metrics.record_scheduled_refresh();
        metrics.record_joined_refresh();

        let expected = CacheMetricsSnapshot::builder()
            .hits(2)
            .misses(1)
            .fetches(1)
            .fetch_errors(1)
            .scheduled_refreshes(1)
            .joined_refreshes(1)
            .build();
        assert_eq!(metrics.snapshot(), expected);
    }

    #[test]
    fn test_hit_rate_without_lookups() {
        assert_eq!(CacheMetricsSnapshot::default().hit_rate(), 0.0);
    }
}
