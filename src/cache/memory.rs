//! In-Memory Cache Module
//!
//! In-process Redis-compatible backend: HashMap storage with TTL expiration,
//! least-recently-used eviction at capacity, and glob pattern scans.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cache::client::glob_match;
use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheClient, CacheEntry, CacheStats};
use crate::error::CacheResult;

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
    /// Logical clock advanced on every access
    tick: u64,
}

impl MemoryState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_least_recent(&mut self) -> Option<String> {
        let key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone())?;
        self.entries.remove(&key);
        Some(key)
    }

    fn sync_total(&mut self) {
        let len = self.entries.len();
        self.stats.set_total_entries(len);
    }
}

// == Memory Cache ==
/// Shared in-process cache. Cheap to wrap in an `Arc` and hand to services.
#[derive(Debug)]
pub struct MemoryCache {
    state: Mutex<MemoryState>,
    /// Maximum number of entries (0 = unbounded)
    max_entries: usize,
}

impl MemoryCache {
    // == Constructor ==
    /// Creates a cache holding at most `max_entries` values (0 = unbounded).
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            max_entries,
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = current_timestamp_ms();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - state.entries.len();
        state.stats.record_expirations(removed);
        state.sync_total();
        removed
    }

    /// Number of stored entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops every entry. Statistics counters are kept.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.sync_total();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut state = self.state.lock().await;

        let expired = state.entries.get(key).map(|entry| entry.is_expired());
        let Some(expired) = expired else {
            state.stats.record_miss();
            return Ok(None);
        };

        if expired {
            state.entries.remove(key);
            state.stats.record_expirations(1);
            state.stats.record_miss();
            state.sync_total();
            return Ok(None);
        }

        let tick = state.next_tick();
        state.stats.record_hit();
        Ok(state.entries.get_mut(key).map(|entry| {
            entry.last_access = tick;
            entry.value.clone()
        }))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let mut state = self.state.lock().await;

        let is_overwrite = state.entries.contains_key(key);
        if !is_overwrite && self.max_entries > 0 && state.entries.len() >= self.max_entries {
            if state.evict_least_recent().is_some() {
                state.stats.record_eviction();
            }
        }

        let tick = state.next_tick();
        state
            .entries
            .insert(key.to_string(), CacheEntry::new(value, ttl, tick));
        state.sync_total();
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<usize> {
        let mut state = self.state.lock().await;
        let removed = keys
            .iter()
            .filter(|key| state.entries.remove(key.as_str()).is_some())
            .count();
        state.sync_total();
        Ok(removed)
    }

    async fn scan(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let state = self.state.lock().await;
        let now = current_timestamp_ms();
        let mut keys: Vec<String> = state
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired_at(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn stats(&self) -> Option<CacheStats> {
        let state = self.state.lock().await;
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.entries.len());
        Some(stats)
    }
}
