//! Configuration Module
//!
//! Handles loading server and cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheKind;

// == TTL Defaults ==
/// Threat models change rarely relative to reads.
pub const THREAT_MODEL_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
/// Diagrams are edited collaboratively, keep staleness tight.
pub const DIAGRAM_CACHE_TTL: Duration = Duration::from_secs(2 * 60);
/// Threats, documents, sources, assets, notes.
pub const SUB_RESOURCE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Authorization data is expensive to recompute and rarely changes.
pub const AUTH_CACHE_TTL: Duration = Duration::from_secs(15 * 60);
pub const METADATA_CACHE_TTL: Duration = Duration::from_secs(7 * 60);
pub const LIST_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Per-kind cache TTL policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTtls {
    pub threat_model: Duration,
    pub diagram: Duration,
    pub sub_resource: Duration,
    pub auth: Duration,
    pub metadata: Duration,
    pub list: Duration,
}

impl CacheTtls {
    /// Loads TTL overrides (in seconds) from the environment.
    ///
    /// # Environment Variables
    /// - `THREAT_MODEL_CACHE_TTL` (default: 600)
    /// - `DIAGRAM_CACHE_TTL` (default: 120)
    /// - `SUB_RESOURCE_CACHE_TTL` (default: 300)
    /// - `AUTH_CACHE_TTL` (default: 900)
    /// - `METADATA_CACHE_TTL` (default: 420)
    /// - `LIST_CACHE_TTL` (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            threat_model: env_secs("THREAT_MODEL_CACHE_TTL", defaults.threat_model),
            diagram: env_secs("DIAGRAM_CACHE_TTL", defaults.diagram),
            sub_resource: env_secs("SUB_RESOURCE_CACHE_TTL", defaults.sub_resource),
            auth: env_secs("AUTH_CACHE_TTL", defaults.auth),
            metadata: env_secs("METADATA_CACHE_TTL", defaults.metadata),
            list: env_secs("LIST_CACHE_TTL", defaults.list),
        }
    }

    /// Returns the TTL that applies to entries of the given kind.
    pub fn for_kind(&self, kind: CacheKind) -> Duration {
        match kind {
            CacheKind::ThreatModel => self.threat_model,
            CacheKind::Diagram | CacheKind::Cells => self.diagram,
            CacheKind::Threat
            | CacheKind::Document
            | CacheKind::Repository
            | CacheKind::Asset
            | CacheKind::Note => self.sub_resource,
            CacheKind::Auth => self.auth,
            CacheKind::Metadata => self.metadata,
            CacheKind::List => self.list,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            threat_model: THREAT_MODEL_CACHE_TTL,
            diagram: DIAGRAM_CACHE_TTL,
            sub_resource: SUB_RESOURCE_CACHE_TTL,
            auth: AUTH_CACHE_TTL,
            metadata: METADATA_CACHE_TTL,
            list: LIST_CACHE_TTL,
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Capacity of the in-process cache backend (0 = unbounded)
    pub cache_max_entries: usize,
    /// Expired-entry sweep interval in seconds for the in-process backend
    pub cleanup_interval: u64,
    /// Redis connection URL; the in-process backend is used when unset
    pub redis_url: Option<String>,
    /// Per-kind cache TTLs
    pub ttls: CacheTtls,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 8080)
    /// - `CACHE_MAX_ENTRIES` - In-process cache capacity (default: 10000)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 30)
    /// - `REDIS_URL` - Redis URL, e.g. `redis://localhost:6379` (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cache_max_entries: env_or("CACHE_MAX_ENTRIES", defaults.cache_max_entries),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            ttls: CacheTtls::from_env(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            cache_max_entries: 10_000,
            cleanup_interval: 30,
            redis_url: None,
            ttls: CacheTtls::default(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.cache_max_entries, 10_000);
        assert_eq!(config.cleanup_interval, 30);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_ttl_policy_by_kind() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.for_kind(CacheKind::ThreatModel), Duration::from_secs(600));
        assert_eq!(ttls.for_kind(CacheKind::Diagram), Duration::from_secs(120));
        assert_eq!(ttls.for_kind(CacheKind::Cells), Duration::from_secs(120));
        assert_eq!(ttls.for_kind(CacheKind::Threat), Duration::from_secs(300));
        assert_eq!(ttls.for_kind(CacheKind::Auth), Duration::from_secs(900));
        assert_eq!(ttls.for_kind(CacheKind::Metadata), Duration::from_secs(420));
        assert_eq!(ttls.for_kind(CacheKind::List), Duration::from_secs(300));
    }

    #[test]
    fn test_diagram_ttl_is_tightest() {
        let ttls = CacheTtls::default();
        assert!(ttls.diagram < ttls.sub_resource);
        assert!(ttls.sub_resource < ttls.auth);
    }

    #[test]
    fn test_config_from_env_defaults() {
        env::remove_var("SERVER_PORT");
        env::remove_var("CACHE_MAX_ENTRIES");
        env::remove_var("CLEANUP_INTERVAL");
        env::remove_var("REDIS_URL");

        let config = Config::from_env();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.cache_max_entries, 10_000);
        assert!(config.redis_url.is_none());
    }
}
