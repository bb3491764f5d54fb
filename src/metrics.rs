//! Metrics & health reporter
//!
//! An injected, thread-safe metrics sink whose lifecycle is tied to the
//! engine instance. Counters are plain atomics; the snapshot is the only
//! read surface and is cheap enough to serve from a health endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::cache::CacheStats;

/// Point-in-time view of the engine's counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Calculations attempted (admitted past the gate).
    pub total_calculations: u64,

    /// Hard failures: validation, reference-data, and integrity errors.
    /// Rejected discounts are successful calculations and not counted here.
    pub error_count: u64,

    /// Mean end-to-end calculation latency in microseconds.
    pub avg_latency_micros: u64,

    /// Fraction of cache reads served without the loader.
    pub cache_hit_rate: f64,

    /// Raw cache counters.
    pub cache: CacheStats,
}

impl MetricsSnapshot {
    /// Fraction of calculations that failed hard; `0.0` before any call.
    #[expect(clippy::cast_precision_loss, reason = "counters are far below 2^52")]
    pub fn error_rate(&self) -> f64 {
        if self.total_calculations == 0 {
            0.0
        } else {
            self.error_count as f64 / self.total_calculations as f64
        }
    }
}

/// Health classification derived from the error rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Error rate below 10%.
    Healthy,

    /// Error rate at or above 10%.
    Degraded,

    /// Error rate at or above 50%.
    Unhealthy,
}

impl HealthStatus {
    /// Classifies a snapshot. An engine that has done nothing is healthy.
    pub fn classify(snapshot: &MetricsSnapshot) -> Self {
        let rate = snapshot.error_rate();

        if rate >= 0.5 {
            Self::Unhealthy
        } else if rate >= 0.1 {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }
}

/// Health snapshot: classification plus the metrics it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Overall classification.
    pub status: HealthStatus,

    /// The underlying counters.
    pub metrics: MetricsSnapshot,
}

/// Atomic counters shared by all in-flight calculations.
#[derive(Debug, Default)]
pub(crate) struct EngineMetrics {
    calculations: AtomicU64,
    errors: AtomicU64,
    latency_micros: AtomicU64,
}

impl EngineMetrics {
    /// Records one finished calculation.
    pub(crate) fn record(&self, elapsed: Duration, failed: bool) {
        self.calculations.fetch_add(1, Ordering::Relaxed);

        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }

        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

        self.latency_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Builds a snapshot, folding in the cache's counters.
    pub(crate) fn snapshot(&self, cache: CacheStats) -> MetricsSnapshot {
        let total = self.calculations.load(Ordering::Relaxed);
        let latency = self.latency_micros.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_calculations: total,
            error_count: self.errors.load(Ordering::Relaxed),
            avg_latency_micros: if total == 0 { 0 } else { latency / total },
            cache_hit_rate: cache.hit_rate(),
            cache,
        }
    }

    /// Zeroes all counters; used by the optional periodic reset task.
    pub(crate) fn reset(&self) {
        self.calculations.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.latency_micros.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_cache_stats() -> CacheStats {
        CacheStats {
            entries: 0,
            hits: 0,
            misses: 0,
        }
    }

    #[test]
    fn snapshot_averages_latency() {
        let metrics = EngineMetrics::default();

        metrics.record(Duration::from_micros(100), false);
        metrics.record(Duration::from_micros(300), false);

        let snapshot = metrics.snapshot(empty_cache_stats());

        assert_eq!(snapshot.total_calculations, 2);
        assert_eq!(snapshot.error_count, 0);
        assert_eq!(snapshot.avg_latency_micros, 200);
    }

    #[test]
    fn snapshot_of_idle_engine_is_zeroed() {
        let metrics = EngineMetrics::default();
        let snapshot = metrics.snapshot(empty_cache_stats());

        assert_eq!(snapshot.total_calculations, 0);
        assert_eq!(snapshot.avg_latency_micros, 0);
        assert_eq!(HealthStatus::classify(&snapshot), HealthStatus::Healthy);
    }

    #[test]
    fn classification_thresholds() {
        let metrics = EngineMetrics::default();

        for _ in 0..8 {
            metrics.record(Duration::from_micros(10), false);
        }

        metrics.record(Duration::from_micros(10), true);

        let snapshot = metrics.snapshot(empty_cache_stats());

        // 1 of 9 is above the 10% line.
        assert_eq!(HealthStatus::classify(&snapshot), HealthStatus::Degraded);

        for _ in 0..9 {
            metrics.record(Duration::from_micros(10), true);
        }

        let snapshot = metrics.snapshot(empty_cache_stats());

        // 10 of 18 is above the 50% line.
        assert_eq!(HealthStatus::classify(&snapshot), HealthStatus::Unhealthy);
    }

    #[test]
    fn reset_zeroes_counters() {
        let metrics = EngineMetrics::default();

        metrics.record(Duration::from_micros(10), true);
        metrics.reset();

        let snapshot = metrics.snapshot(empty_cache_stats());

        assert_eq!(snapshot.total_calculations, 0);
        assert_eq!(snapshot.error_count, 0);
    }
}
