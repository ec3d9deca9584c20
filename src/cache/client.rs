//! Cache Client Module
//!
//! The minimal Redis-compatible surface the cache layer needs: get, set with
//! TTL, delete, and pattern scan.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::CacheStats;
use crate::error::CacheResult;

/// A Redis-compatible key-value cache client.
///
/// Implementations must be safe to share across requests. A missing key is
/// `Ok(None)`, never an error.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Deletes the given keys. Absent keys are ignored. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> CacheResult<usize>;

    /// Enumerates keys matching a glob pattern (`*`, `?`, `\` escape).
    async fn scan(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Liveness probe.
    async fn ping(&self) -> CacheResult<()>;

    /// Backend statistics, when the backend keeps any.
    async fn stats(&self) -> Option<CacheStats> {
        None
    }
}

// == Glob Matching ==
/// Redis-style glob match supporting `*`, `?` and `\`-escaped literals.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0usize, 0usize);
    // Backtrack point: position after the last `*` and the key index it matched up to
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p + 1, k));
                p += 1;
            }
            Some('?') => {
                p += 1;
                k += 1;
            }
            Some('\\') if p + 1 < pattern.len() && pattern[p + 1] == key[k] => {
                p += 2;
                k += 1;
            }
            Some(c) if *c != '\\' && *c == key[k] => {
                p += 1;
                k += 1;
            }
            _ => match star {
                Some((star_p, star_k)) => {
                    p = star_p;
                    k = star_k + 1;
                    star = Some((star_p, star_k + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
