//! Cache Service Module
//!
//! Typed write-through caching for entities, collections and paginated lists
//! on top of any [`CacheClient`]. A miss is `Ok(None)`; client and
//! (de)serialization failures are logged and returned so callers can treat
//! them exactly like a miss.

use std::future::Future;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};

use crate::cache::keys::{self, CacheKind};
use crate::cache::metrics::{CacheEvent, CacheMetrics, CacheMetricsSnapshot};
use crate::cache::{CacheClient, CacheStats};
use crate::config::CacheTtls;
use crate::error::CacheResult;
use crate::models::{
    AuthorizationData, Cell, Diagram, Document, Entity, Metadata, Repository, Threat, ThreatModel,
};

// == Cache Service ==
pub struct CacheService {
    client: Arc<dyn CacheClient>,
    ttls: CacheTtls,
    metrics: CacheMetrics,
}

impl CacheService {
    pub fn new(client: Arc<dyn CacheClient>, ttls: CacheTtls) -> Self {
        Self {
            client,
            ttls,
            metrics: CacheMetrics::new(),
        }
    }

    pub fn client(&self) -> &Arc<dyn CacheClient> {
        &self.client
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn backend_stats(&self) -> Option<CacheStats> {
        self.client.stats().await
    }

    // == Core Operations ==
    /// Serializes `value` and stores it under `key` with the kind's TTL.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        kind: CacheKind,
        key: &str,
        value: &T,
    ) -> CacheResult<()> {
        let data = serde_json::to_string(value).map_err(|e| {
            error!("Failed to marshal {} for cache key {}: {}", kind.as_str(), key, e);
            self.metrics.record(kind, CacheEvent::Error);
            e
        })?;

        let ttl = self.ttls.for_kind(kind);
        if let Err(e) = self.client.set(key, data, ttl).await {
            error!("Failed to cache {}: {}", key, e);
            self.metrics.record(kind, CacheEvent::Error);
            return Err(e);
        }

        self.metrics.record(kind, CacheEvent::Write);
        debug!("Cached {} with TTL {:?}", key, ttl);
        Ok(())
    }

    /// Reads and deserializes the value under `key`. `Ok(None)` on a miss.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        kind: CacheKind,
        key: &str,
    ) -> CacheResult<Option<T>> {
        let data = match self.client.get(key).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!("Cache miss for {}", key);
                self.metrics.record(kind, CacheEvent::Miss);
                return Ok(None);
            }
            Err(e) => {
                error!("Failed to get cached {}: {}", key, e);
                self.metrics.record(kind, CacheEvent::Error);
                return Err(e);
            }
        };

        match serde_json::from_str(&data) {
            Ok(value) => {
                debug!("Cache hit for {}", key);
                self.metrics.record(kind, CacheEvent::Hit);
                Ok(Some(value))
            }
            Err(e) => {
                error!("Failed to unmarshal cached {}: {}", key, e);
                self.metrics.record(kind, CacheEvent::Error);
                Err(e.into())
            }
        }
    }

    async fn remove(&self, kind: CacheKind, key: String) -> CacheResult<()> {
        match self.client.delete(std::slice::from_ref(&key)).await {
            Ok(_) => {
                self.metrics.record(kind, CacheEvent::Delete);
                debug!("Invalidated cache for {}", key);
                Ok(())
            }
            Err(e) => {
                error!("Failed to invalidate cache for {}: {}", key, e);
                self.metrics.record(kind, CacheEvent::Error);
                Err(e)
            }
        }
    }

    // == Cache-Aside Read ==
    /// Returns the cached value for `key`, or runs `loader` against the system
    /// of record and repopulates the cache.
    ///
    /// Cache errors are treated as misses and never reach the caller; a failed
    /// repopulation is only logged.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        kind: CacheKind,
        key: &str,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.fetch::<T>(kind, key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => warn!("Cache read for {} failed, falling back to store: {}", key, e),
        }

        let value = loader().await?;
        if let Err(e) = self.put(kind, key, &value).await {
            warn!("Cache repopulation for {} failed: {}", key, e);
        }
        Ok(value)
    }

    // == Entities ==
    /// Write-through for any single entity, keyed `cache:<kind>:<id>`.
    pub async fn cache_entity<T: Entity>(&self, entity: &T) -> CacheResult<()> {
        let key = keys::entity_key(T::CACHE_KIND, &entity.entity_id());
        self.put(T::CACHE_KIND, &key, entity).await
    }

    pub async fn get_cached_entity<T: Entity>(&self, id: &str) -> CacheResult<Option<T>> {
        let key = keys::entity_key(T::CACHE_KIND, id);
        self.fetch(T::CACHE_KIND, &key).await
    }

    pub async fn cache_threat_model(&self, threat_model: &ThreatModel) -> CacheResult<()> {
        self.cache_entity(threat_model).await
    }

    pub async fn get_cached_threat_model(&self, id: &str) -> CacheResult<Option<ThreatModel>> {
        self.get_cached_entity(id).await
    }

    pub async fn cache_diagram(&self, diagram: &Diagram) -> CacheResult<()> {
        self.cache_entity(diagram).await
    }

    pub async fn get_cached_diagram(&self, id: &str) -> CacheResult<Option<Diagram>> {
        self.get_cached_entity(id).await
    }

    pub async fn cache_threat(&self, threat: &Threat) -> CacheResult<()> {
        self.cache_entity(threat).await
    }

    pub async fn get_cached_threat(&self, id: &str) -> CacheResult<Option<Threat>> {
        self.get_cached_entity(id).await
    }

    pub async fn cache_document(&self, document: &Document) -> CacheResult<()> {
        self.cache_entity(document).await
    }

    pub async fn get_cached_document(&self, id: &str) -> CacheResult<Option<Document>> {
        self.get_cached_entity(id).await
    }

    pub async fn cache_repository(&self, repository: &Repository) -> CacheResult<()> {
        self.cache_entity(repository).await
    }

    pub async fn get_cached_repository(&self, id: &str) -> CacheResult<Option<Repository>> {
        self.get_cached_entity(id).await
    }

    // == Collections ==
    pub async fn cache_metadata(
        &self,
        entity_type: &str,
        entity_id: &str,
        metadata: &[Metadata],
    ) -> CacheResult<()> {
        let key = keys::metadata_key(entity_type, entity_id);
        self.put(CacheKind::Metadata, &key, metadata).await
    }

    pub async fn get_cached_metadata(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> CacheResult<Option<Vec<Metadata>>> {
        let key = keys::metadata_key(entity_type, entity_id);
        self.fetch(CacheKind::Metadata, &key).await
    }

    pub async fn cache_cells(&self, diagram_id: &str, cells: &[Cell]) -> CacheResult<()> {
        self.put(CacheKind::Cells, &keys::cells_key(diagram_id), cells)
            .await
    }

    pub async fn get_cached_cells(&self, diagram_id: &str) -> CacheResult<Option<Vec<Cell>>> {
        self.fetch(CacheKind::Cells, &keys::cells_key(diagram_id))
            .await
    }

    pub async fn cache_auth_data(
        &self,
        threat_model_id: &str,
        auth_data: &AuthorizationData,
    ) -> CacheResult<()> {
        self.put(CacheKind::Auth, &keys::auth_key(threat_model_id), auth_data)
            .await
    }

    pub async fn get_cached_auth_data(
        &self,
        threat_model_id: &str,
    ) -> CacheResult<Option<AuthorizationData>> {
        self.fetch(CacheKind::Auth, &keys::auth_key(threat_model_id))
            .await
    }

    // == Paginated Lists ==
    /// Caches one page. Pages are keyed by the exact (type, parent, offset, limit) tuple.
    pub async fn cache_list<T: Serialize + ?Sized>(
        &self,
        entity_type: &str,
        parent_id: &str,
        offset: usize,
        limit: usize,
        page: &T,
    ) -> CacheResult<()> {
        let key = keys::list_key(entity_type, parent_id, offset, limit);
        self.put(CacheKind::List, &key, page).await
    }

    pub async fn get_cached_list<T: DeserializeOwned>(
        &self,
        entity_type: &str,
        parent_id: &str,
        offset: usize,
        limit: usize,
    ) -> CacheResult<Option<T>> {
        let key = keys::list_key(entity_type, parent_id, offset, limit);
        self.fetch(CacheKind::List, &key).await
    }

    // == Invalidation ==
    /// Deletes the single-entity entry. Entity types without one are a no-op.
    pub async fn invalidate_entity(&self, entity_type: &str, entity_id: &str) -> CacheResult<()> {
        match CacheKind::for_entity_type(entity_type) {
            Some(kind) => self.remove(kind, keys::entity_key(kind, entity_id)).await,
            None => {
                debug!("No entity cache entry for type {}", entity_type);
                Ok(())
            }
        }
    }

    pub async fn invalidate_metadata(&self, entity_type: &str, entity_id: &str) -> CacheResult<()> {
        self.remove(CacheKind::Metadata, keys::metadata_key(entity_type, entity_id))
            .await
    }

    pub async fn invalidate_auth_data(&self, threat_model_id: &str) -> CacheResult<()> {
        self.remove(CacheKind::Auth, keys::auth_key(threat_model_id))
            .await
    }

    pub async fn invalidate_cells(&self, diagram_id: &str) -> CacheResult<()> {
        self.remove(CacheKind::Cells, keys::cells_key(diagram_id))
            .await
    }

    /// Scans for every cached page of `(entity_type, parent_id)` and deletes them.
    /// Returns the number of entries removed.
    pub async fn invalidate_list_pattern(
        &self,
        entity_type: &str,
        parent_id: &str,
    ) -> CacheResult<usize> {
        let pattern = keys::list_pattern(entity_type, parent_id);
        let found = self.client.scan(&pattern).await.map_err(|e| {
            error!("Failed to scan for list keys with pattern {}: {}", pattern, e);
            self.metrics.record(CacheKind::List, CacheEvent::Error);
            e
        })?;

        if found.is_empty() {
            return Ok(0);
        }

        let removed = self.client.delete(&found).await.map_err(|e| {
            error!("Failed to delete list keys for {}: {}", pattern, e);
            self.metrics.record(CacheKind::List, CacheEvent::Error);
            e
        })?;
        self.metrics.record(CacheKind::List, CacheEvent::Delete);
        debug!(
            "Invalidated {} paginated list entries for {}:{}",
            removed, entity_type, parent_id
        );
        Ok(removed)
    }
}
