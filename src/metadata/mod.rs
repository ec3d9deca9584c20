//! Metadata Module
//!
//! Key/value annotations on any entity kind, keyed by the triple
//! `(entity_type, entity_id, key)`. Reads go through the metadata-collection
//! cache; every mutation invalidates it along with the owning entity's entry.

mod memory;
mod validation;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Metadata, MetadataEntry};

pub use memory::MemoryMetadataStore;
pub use validation::{
    validate_bulk_keys, validate_bulk_metadata, validate_entity_type, validate_metadata_key,
    validate_owner, MAX_BULK_METADATA, SUPPORTED_ENTITY_TYPES,
};

// == Metadata Store ==
/// Storage contract shared by every entity kind's metadata routes.
///
/// Listing an entity with no metadata yields an empty collection. Bulk calls
/// with empty input succeed without side effects.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, entity_type: &str, entity_id: &str, key: &str) -> Result<Metadata>;

    /// Entries of one entity, ordered by key.
    async fn list(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Metadata>>;

    async fn list_keys(&self, entity_type: &str, entity_id: &str) -> Result<Vec<String>>;

    /// Conflict when the triple already exists.
    async fn create(&self, entity_type: &str, entity_id: &str, metadata: Metadata) -> Result<Metadata>;

    /// Upsert; never fails on pre-existence.
    async fn post(&self, entity_type: &str, entity_id: &str, metadata: Metadata) -> Result<Metadata>;

    /// NotFound when the triple does not exist.
    async fn update(&self, entity_type: &str, entity_id: &str, metadata: Metadata) -> Result<Metadata>;

    /// NotFound when the triple does not exist.
    async fn delete(&self, entity_type: &str, entity_id: &str, key: &str) -> Result<()>;

    /// Conflict when any key already exists; nothing is written in that case.
    async fn bulk_create(
        &self,
        entity_type: &str,
        entity_id: &str,
        entries: Vec<Metadata>,
    ) -> Result<Vec<Metadata>>;

    /// Upserts every entry.
    async fn bulk_update(
        &self,
        entity_type: &str,
        entity_id: &str,
        entries: Vec<Metadata>,
    ) -> Result<Vec<Metadata>>;

    /// Deletes whichever keys exist. Returns how many were removed.
    async fn bulk_delete(&self, entity_type: &str, entity_id: &str, keys: &[String]) -> Result<usize>;

    /// Every triple carrying `key`, across all owning entities.
    async fn get_by_key(&self, key: &str) -> Result<Vec<MetadataEntry>>;

    /// Removes all metadata of one entity. Callers deleting the entity itself
    /// decide whether to call this.
    async fn delete_all(&self, entity_type: &str, entity_id: &str) -> Result<usize>;

    /// Drops the cached collection for one entity.
    async fn invalidate_cache(&self, entity_type: &str, entity_id: &str) -> Result<()>;

    /// Loads one entity's collection from storage into the cache.
    async fn warm_cache(&self, entity_type: &str, entity_id: &str) -> Result<()>;
}
