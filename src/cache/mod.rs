//! Cache Module
//!
//! Cache-consistency layer: a Redis-compatible client abstraction, typed
//! write-through caching per entity kind, and cascading invalidation across
//! the parent/child entity graph.

mod client;
mod entry;
mod invalidation;
mod keys;
mod memory;
mod metrics;
#[cfg(feature = "redis")]
mod redis;
mod service;
mod stats;


// Re-export public types
pub use client::{glob_match, CacheClient};
pub use entry::CacheEntry;
pub use invalidation::{CacheInvalidator, InvalidationEvent, InvalidationStrategy, OperationType};
pub use keys::{auth_key, cells_key, entity_key, list_key, list_pattern, metadata_key, CacheKind};
pub use memory::MemoryCache;
pub use metrics::{CacheEvent, CacheMetrics, CacheMetricsSnapshot, KindMetrics};
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;
pub use service::CacheService;
pub use stats::CacheStats;
