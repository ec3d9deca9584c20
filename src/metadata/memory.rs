//! In-memory metadata store
//!
//! `BTreeMap` keyed by `(entity_type, entity_id, key)`, so one entity's
//! entries are a contiguous, key-ordered range.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::validation::{
    validate_bulk_keys, validate_bulk_metadata, validate_entity_type, validate_metadata_key,
    validate_owner,
};
use super::MetadataStore;
use crate::cache::{metadata_key, CacheInvalidator, CacheKind, CacheService, InvalidationEvent, OperationType};
use crate::error::{ApiError, Result};
use crate::models::{Metadata, MetadataEntry};

type Triple = (String, String, String);

fn triple(entity_type: &str, entity_id: &str, key: &str) -> Triple {
    (entity_type.to_string(), entity_id.to_string(), key.to_string())
}

fn entity_range<'a>(
    entries: &'a BTreeMap<Triple, String>,
    entity_type: &'a str,
    entity_id: &'a str,
) -> impl Iterator<Item = (&'a Triple, &'a String)> + 'a {
    entries
        .range(triple(entity_type, entity_id, "")..)
        .take_while(move |((t, id, _), _)| t == entity_type && id == entity_id)
}

fn not_found(entity_type: &str, entity_id: &str, key: &str) -> ApiError {
    ApiError::NotFound(format!(
        "metadata key '{}' not found for {} {}",
        key, entity_type, entity_id
    ))
}

// == Memory Metadata Store ==
pub struct MemoryMetadataStore {
    entries: RwLock<BTreeMap<Triple, String>>,
    cache: Option<Arc<CacheService>>,
    invalidator: Option<CacheInvalidator>,
}

impl MemoryMetadataStore {
    /// Store without a cache in front of it.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            cache: None,
            invalidator: None,
        }
    }

    /// Store with cache-aside reads and invalidate-on-write.
    pub fn with_cache(cache: Arc<CacheService>, invalidator: CacheInvalidator) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            cache: Some(cache),
            invalidator: Some(invalidator),
        }
    }

    async fn load(&self, entity_type: &str, entity_id: &str) -> Vec<Metadata> {
        let entries = self.entries.read().await;
        entity_range(&entries, entity_type, entity_id)
            .map(|((_, _, key), value)| Metadata::new(key.clone(), value.clone()))
            .collect()
    }

    /// Emits the metadata invalidation event. Failures are logged, never returned.
    async fn invalidate(
        &self,
        entity_type: &str,
        entity_id: &str,
        key: Option<&str>,
        operation: OperationType,
    ) {
        let Some(invalidator) = &self.invalidator else {
            return;
        };
        let event = InvalidationEvent::metadata(entity_type, entity_id, key, operation);
        if let Err(e) = invalidator.invalidate_sub_resource_change(event).await {
            warn!(
                "Failed to invalidate caches after metadata {} on {}:{}: {}",
                operation, entity_type, entity_id, e
            );
        }
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, entity_type: &str, entity_id: &str, key: &str) -> Result<Metadata> {
        validate_owner(entity_type, entity_id)?;
        validate_metadata_key(key)?;

        self.list(entity_type, entity_id)
            .await?
            .into_iter()
            .find(|m| m.key == key)
            .ok_or_else(|| not_found(entity_type, entity_id, key))
    }

    async fn list(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Metadata>> {
        validate_owner(entity_type, entity_id)?;

        match &self.cache {
            Some(cache) => {
                let key = metadata_key(entity_type, entity_id);
                cache
                    .get_or_fetch(CacheKind::Metadata, &key, || async move {
                        Ok::<_, ApiError>(self.load(entity_type, entity_id).await)
                    })
                    .await
            }
            None => Ok(self.load(entity_type, entity_id).await),
        }
    }

    async fn list_keys(&self, entity_type: &str, entity_id: &str) -> Result<Vec<String>> {
        Ok(self
            .list(entity_type, entity_id)
            .await?
            .into_iter()
            .map(|m| m.key)
            .collect())
    }

    async fn create(&self, entity_type: &str, entity_id: &str, metadata: Metadata) -> Result<Metadata> {
        validate_owner(entity_type, entity_id)?;
        validate_metadata_key(&metadata.key)?;

        {
            let mut entries = self.entries.write().await;
            let id = triple(entity_type, entity_id, &metadata.key);
            if entries.contains_key(&id) {
                return Err(ApiError::Conflict(format!(
                    "metadata key '{}' already exists for {} {}",
                    metadata.key, entity_type, entity_id
                )));
            }
            entries.insert(id, metadata.value.clone());
        }

        debug!("Created metadata {} for {}:{}", metadata.key, entity_type, entity_id);
        self.invalidate(entity_type, entity_id, Some(&metadata.key), OperationType::MetadataCreate)
            .await;
        Ok(metadata)
    }

    async fn post(&self, entity_type: &str, entity_id: &str, metadata: Metadata) -> Result<Metadata> {
        validate_owner(entity_type, entity_id)?;
        validate_metadata_key(&metadata.key)?;

        let existed = self
            .entries
            .write()
            .await
            .insert(triple(entity_type, entity_id, &metadata.key), metadata.value.clone())
            .is_some();

        let operation = if existed {
            OperationType::MetadataUpdate
        } else {
            OperationType::MetadataCreate
        };
        self.invalidate(entity_type, entity_id, Some(&metadata.key), operation)
            .await;
        Ok(metadata)
    }

    async fn update(&self, entity_type: &str, entity_id: &str, metadata: Metadata) -> Result<Metadata> {
        validate_owner(entity_type, entity_id)?;
        validate_metadata_key(&metadata.key)?;

        {
            let mut entries = self.entries.write().await;
            let value = entries
                .get_mut(&triple(entity_type, entity_id, &metadata.key))
                .ok_or_else(|| not_found(entity_type, entity_id, &metadata.key))?;
            *value = metadata.value.clone();
        }

        self.invalidate(entity_type, entity_id, Some(&metadata.key), OperationType::MetadataUpdate)
            .await;
        Ok(metadata)
    }

    async fn delete(&self, entity_type: &str, entity_id: &str, key: &str) -> Result<()> {
        validate_owner(entity_type, entity_id)?;
        validate_metadata_key(key)?;

        self.entries
            .write()
            .await
            .remove(&triple(entity_type, entity_id, key))
            .ok_or_else(|| not_found(entity_type, entity_id, key))?;

        self.invalidate(entity_type, entity_id, Some(key), OperationType::MetadataDelete)
            .await;
        Ok(())
    }

    async fn bulk_create(
        &self,
        entity_type: &str,
        entity_id: &str,
        entries: Vec<Metadata>,
    ) -> Result<Vec<Metadata>> {
        validate_owner(entity_type, entity_id)?;
        validate_bulk_metadata(&entries)?;
        if entries.is_empty() {
            return Ok(entries);
        }

        {
            let mut stored = self.entries.write().await;
            if let Some(existing) = entries
                .iter()
                .find(|m| stored.contains_key(&triple(entity_type, entity_id, &m.key)))
            {
                return Err(ApiError::Conflict(format!(
                    "metadata key '{}' already exists for {} {}",
                    existing.key, entity_type, entity_id
                )));
            }
            for m in &entries {
                stored.insert(triple(entity_type, entity_id, &m.key), m.value.clone());
            }
        }

        debug!("Bulk created {} metadata entries for {}:{}", entries.len(), entity_type, entity_id);
        self.invalidate(entity_type, entity_id, None, OperationType::MetadataCreate)
            .await;
        Ok(entries)
    }

    async fn bulk_update(
        &self,
        entity_type: &str,
        entity_id: &str,
        entries: Vec<Metadata>,
    ) -> Result<Vec<Metadata>> {
        validate_owner(entity_type, entity_id)?;
        validate_bulk_metadata(&entries)?;
        if entries.is_empty() {
            return Ok(entries);
        }

        {
            let mut stored = self.entries.write().await;
            for m in &entries {
                stored.insert(triple(entity_type, entity_id, &m.key), m.value.clone());
            }
        }

        self.invalidate(entity_type, entity_id, None, OperationType::MetadataUpdate)
            .await;
        Ok(entries)
    }

    async fn bulk_delete(&self, entity_type: &str, entity_id: &str, keys: &[String]) -> Result<usize> {
        validate_owner(entity_type, entity_id)?;
        validate_bulk_keys(keys)?;
        if keys.is_empty() {
            return Ok(0);
        }

        let removed = {
            let mut stored = self.entries.write().await;
            keys.iter()
                .filter(|key| stored.remove(&triple(entity_type, entity_id, key)).is_some())
                .count()
        };

        debug!(
            "Bulk deleted {} of {} metadata keys for {}:{}",
            removed,
            keys.len(),
            entity_type,
            entity_id
        );
        self.invalidate(entity_type, entity_id, None, OperationType::MetadataDelete)
            .await;
        Ok(removed)
    }

    async fn get_by_key(&self, key: &str) -> Result<Vec<MetadataEntry>> {
        validate_metadata_key(key)?;

        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|((_, _, k), _)| k == key)
            .map(|((entity_type, entity_id, k), value)| MetadataEntry {
                entity_type: entity_type.clone(),
                entity_id: entity_id.clone(),
                key: k.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn delete_all(&self, entity_type: &str, entity_id: &str) -> Result<usize> {
        validate_owner(entity_type, entity_id)?;

        let removed = {
            let mut stored = self.entries.write().await;
            let keys: Vec<Triple> = entity_range(&stored, entity_type, entity_id)
                .map(|(t, _)| t.clone())
                .collect();
            for t in &keys {
                stored.remove(t);
            }
            keys.len()
        };

        if removed > 0 {
            self.invalidate(entity_type, entity_id, None, OperationType::MetadataDelete)
                .await;
        }
        Ok(removed)
    }

    async fn invalidate_cache(&self, entity_type: &str, entity_id: &str) -> Result<()> {
        validate_entity_type(entity_type)?;
        if let Some(cache) = &self.cache {
            cache.invalidate_metadata(entity_type, entity_id).await?;
        }
        Ok(())
    }

    async fn warm_cache(&self, entity_type: &str, entity_id: &str) -> Result<()> {
        validate_owner(entity_type, entity_id)?;
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        let metadata = self.load(entity_type, entity_id).await;
        cache.cache_metadata(entity_type, entity_id, &metadata).await?;
        debug!("Warmed metadata cache for {}:{} ({} entries)", entity_type, entity_id, metadata.len());
        Ok(())
    }
}
