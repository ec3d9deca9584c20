//! Response DTOs
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheMetricsSnapshot, CacheStats};

/// Response body for `GET /cache/stats`
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    /// Backend counters, absent for backends that keep none
    pub backend: Option<CacheStats>,
    /// Hit rate reported by the backend (hits / (hits + misses))
    pub backend_hit_rate: Option<f64>,
    /// Per-kind counters kept by the cache service
    pub metrics: CacheMetricsSnapshot,
}

impl CacheStatsResponse {
    pub fn new(backend: Option<CacheStats>, metrics: CacheMetricsSnapshot) -> Self {
        Self {
            backend_hit_rate: backend.as_ref().map(CacheStats::hit_rate),
            backend,
            metrics,
        }
    }
}

/// Response body for `GET /cache/patterns`
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationPatternResponse {
    pub entity_type: String,
    pub entity_id: String,
    pub patterns: Vec<String>,
}

/// Response body for bulk metadata writes
#[derive(Debug, Clone, Serialize)]
pub struct BulkResponse {
    pub count: usize,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" when the cache answers, "degraded" otherwise
    pub status: String,
    pub cache: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Builds the response for a cache ping outcome. A failed ping degrades
    /// the service but does not take it down.
    pub fn from_ping(cache_ok: bool) -> Self {
        let (status, cache) = if cache_ok {
            ("healthy", "ok")
        } else {
            ("degraded", "unavailable")
        };
        Self {
            status: status.to_string(),
            cache: cache.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
