use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live per-namespace counters, updated in-line with operations.
#[derive(Debug, Default)]
pub(crate) struct ShardCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub puts: AtomicU64,
    pub evictions: AtomicU64,
    pub refresh_failures: AtomicU64,
    pub rejected_sets: AtomicU64,
}

impl ShardCounters {
    pub fn bump_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_evictions(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }
}

/// Snapshot of one namespace's statistics.
///
/// `hit_rate` is derived as `hits / (hits + misses)` and 0 when idle.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub namespace: String,
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub refresh_failures: u64,
    pub rejected_sets: u64,
    pub size: usize,
    /// Wall-clock creation time of the oldest live entry, ms since epoch.
    pub oldest_entry_ms: Option<u64>,
    pub newest_entry_ms: Option<u64>,
    pub average_ttl_ms: u64,
    pub hit_rate: f64,
    /// Live entry counts indexed by priority (`Low` .. `Critical`).
    pub priority_counts: [usize; 4],
}

impl CacheStats {
    pub(crate) fn derive(namespace: &str, counters: &ShardCounters) -> CacheStats {
        let hits = counters.hits.load(Ordering::Relaxed);
        let misses = counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            namespace: namespace.to_string(),
            hits,
            misses,
            puts: counters.puts.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            refresh_failures: counters.refresh_failures.load(Ordering::Relaxed),
            rejected_sets: counters.rejected_sets.load(Ordering::Relaxed),
            size: 0,
            oldest_entry_ms: None,
            newest_entry_ms: None,
            average_ttl_ms: 0,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            priority_counts: [0; 4],
        }
    }
}
