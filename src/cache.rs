//! Cache store
//!
//! Bounded, TTL'd store for reference data. Every resolver read goes through
//! [`ReferenceCache::get_or_load`]; a hit within the entry's TTL skips the
//! backing store entirely. Entries carry their own TTL so each reference-data
//! class (rates, discounts, taxes, gateway ids) ages independently inside one
//! map.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::provider::{Discount, ProviderError, TaxRule};

/// When the store is full, the oldest fifth of entries is dropped.
const EVICTION_DENOMINATOR: usize = 5;

/// A typed cached value.
///
/// One variant per reference-data shape; the resolver matches the variant it
/// stored and treats anything else as a cache-integrity failure.
#[derive(Debug, Clone)]
pub(crate) enum CachedValue {
    /// A currency code (base-currency lookups).
    Code(String),

    /// An exchange rate row, if present.
    Rate(Option<Decimal>),

    /// A discount record, if present.
    Discount(Option<Box<Discount>>),

    /// A usage count.
    Count(u64),

    /// A boolean flag (first-time-user lookups).
    Flag(bool),

    /// A tax rule set.
    TaxRules(Vec<TaxRule>),

    /// A gateway numeric id, if the gateway is known.
    GatewayId(Option<i64>),
}

struct CacheEntry {
    value: CachedValue,
    stored_at: Instant,
    ttl: Duration,
}

/// Hit/miss statistics for the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries currently resident.
    pub entries: usize,

    /// Reads served from the store.
    pub hits: u64,

    /// Reads that invoked the loader.
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of reads served from the store; `0.0` before any read.
    #[expect(clippy::cast_precision_loss, reason = "counters are far below 2^52")]
    pub fn hit_rate(&self) -> f64 {
        let reads = self.hits + self.misses;

        if reads == 0 {
            0.0
        } else {
            self.hits as f64 / reads as f64
        }
    }
}

/// Bounded concurrent cache with per-entry TTLs.
#[derive(Debug)]
pub(crate) struct ReferenceCache {
    entries: DashMap<String, CacheEntry>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("stored_at", &self.stored_at)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ReferenceCache {
    /// Creates a cache holding at most `capacity` entries.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached value for `key`, or invokes `loader`, stores the
    /// result under `ttl`, and returns it.
    ///
    /// Loader failures are propagated untouched and nothing is stored, so a
    /// flaky backing store is retried on the next read rather than cached.
    pub(crate) async fn get_or_load<F, Fut>(
        &self,
        key: String,
        ttl: Duration,
        loader: F,
    ) -> Result<CachedValue, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedValue, ProviderError>>,
    {
        if let Some(value) = self.fresh(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        let value = loader().await?;

        self.insert(key, ttl, value.clone());

        Ok(value)
    }

    /// Removes entries whose key starts with `pattern`, or everything when
    /// `pattern` is `None`. Used for explicit invalidation after external
    /// mutation of discount, tax, or rate data.
    pub(crate) fn clear(&self, pattern: Option<&str>) {
        match pattern {
            None => self.entries.clear(),
            Some(prefix) => self.entries.retain(|key, _| !key.starts_with(prefix)),
        }
    }

    /// Drops entries older than their TTL. Run by the engine's background
    /// sweep so memory stays bounded even under low query diversity.
    pub(crate) fn sweep(&self) {
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() < entry.ttl);
    }

    /// Current statistics snapshot.
    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Resets hit/miss counters, leaving entries in place.
    pub(crate) fn reset_counters(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    fn fresh(&self, key: &str) -> Option<CachedValue> {
        let entry = self.entries.get(key)?;

        (entry.stored_at.elapsed() < entry.ttl).then(|| entry.value.clone())
    }

    fn insert(&self, key: String, ttl: Duration, value: CachedValue) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.evict_oldest_fraction();
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Evicts the oldest fifth of entries by insertion time.
    fn evict_oldest_fraction(&self) {
        let mut stamped: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.stored_at))
            .collect();

        stamped.sort_by_key(|(_, stored_at)| *stored_at);

        let to_evict = stamped.len().div_ceil(EVICTION_DENOMINATOR);

        for (key, _) in stamped.into_iter().take(to_evict) {
            self.entries.remove(&key);
        }
    }
}
