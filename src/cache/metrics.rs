//! Cache Metrics Module
//!
//! Per-kind counters kept by the cache service, independent of the backend.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::CacheKind;

#[derive(Debug, Default)]
struct KindCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

/// Counter events recorded by [`CacheMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Hit,
    Miss,
    Write,
    Delete,
    Error,
}

// == Cache Metrics ==
/// Lock-free hit/miss/write/delete/error counters, one set per [`CacheKind`].
#[derive(Debug, Default)]
pub struct CacheMetrics {
    kinds: [KindCounters; CacheKind::ALL.len()],
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: CacheKind, event: CacheEvent) {
        let counters = &self.kinds[kind.index()];
        let counter = match event {
            CacheEvent::Hit => &counters.hits,
            CacheEvent::Miss => &counters.misses,
            CacheEvent::Write => &counters.writes,
            CacheEvent::Delete => &counters.deletes,
            CacheEvent::Error => &counters.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        let kinds: Vec<KindMetrics> = CacheKind::ALL
            .iter()
            .map(|kind| {
                let c = &self.kinds[kind.index()];
                KindMetrics {
                    kind: *kind,
                    hits: c.hits.load(Ordering::Relaxed),
                    misses: c.misses.load(Ordering::Relaxed),
                    writes: c.writes.load(Ordering::Relaxed),
                    deletes: c.deletes.load(Ordering::Relaxed),
                    errors: c.errors.load(Ordering::Relaxed),
                }
            })
            .collect();

        let total_hits: u64 = kinds.iter().map(|k| k.hits).sum();
        let total_misses: u64 = kinds.iter().map(|k| k.misses).sum();
        let total_errors: u64 = kinds.iter().map(|k| k.errors).sum();
        let lookups = total_hits + total_misses;

        CacheMetricsSnapshot {
            total_hits,
            total_misses,
            total_errors,
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                total_hits as f64 / lookups as f64
            },
            kinds,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KindMetrics {
    pub kind: CacheKind,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub deletes: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheMetricsSnapshot {
    pub total_hits: u64,
    pub total_misses: u64,
    pub total_errors: u64,
    pub hit_ratio: f64,
    pub kinds: Vec<KindMetrics>,
}

impl CacheMetricsSnapshot {
    pub fn for_kind(&self, kind: CacheKind) -> Option<&KindMetrics> {
        self.kinds.iter().find(|k| k.kind == kind)
    }
}
