//! Entity Store Module
//!
//! Boundary to the system of record. Backend adapters translate driver
//! failures into [`StoreError`] here, so callers branch on a typed Conflict
//! or NotFound instead of inspecting messages.

mod memory;

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

use crate::error::{ApiError, Result};
use crate::models::Entity;

pub use memory::MemoryEntityStore;

/// Maximum entities in one bulk create.
pub const MAX_BULK_ENTITIES: usize = 50;

// == Store Error ==
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Backend(String),
}

/// Substrings relational drivers use for unique-constraint violations.
const CONFLICT_SIGNATURES: &[&str] = &[
    "duplicate key",
    "unique constraint",
    "ora-00001",
    "unique constraint failed",
];

/// Substrings drivers use when a row lookup finds nothing.
const NOT_FOUND_SIGNATURES: &[&str] = &["no rows in result set", "record not found"];

impl StoreError {
    /// Classifies a driver error message. Only backend adapters call this.
    pub fn from_driver_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if CONFLICT_SIGNATURES.iter().any(|s| lower.contains(s)) {
            StoreError::Conflict(message)
        } else if NOT_FOUND_SIGNATURES.iter().any(|s| lower.contains(s)) {
            StoreError::NotFound(message)
        } else {
            StoreError::Backend(message)
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::Conflict(_) => ApiError::Conflict(err.to_string()),
            StoreError::Backend(_) => ApiError::ServerError(err.to_string()),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// == Entity Store ==
/// Per-entity persistence contract consumed by the cache-aside read path and
/// the patch flow.
#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    async fn create(&self, entity: T) -> StoreResult<T>;

    async fn get(&self, id: &str) -> StoreResult<T>;

    /// Replaces the stored entity wholesale. Last write wins.
    async fn update(&self, entity: T) -> StoreResult<T>;

    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// One page, optionally restricted to children of `parent_id`.
    async fn list(&self, parent_id: Option<&str>, offset: usize, limit: usize) -> StoreResult<Vec<T>>;

    /// All-or-nothing insert of a validated batch.
    async fn bulk_create(&self, entities: Vec<T>) -> StoreResult<Vec<T>>;
}

/// Size bound and identifier uniqueness, checked before any write.
pub fn validate_bulk_entities<T: Entity>(entities: &[T]) -> Result<()> {
    if entities.len() > MAX_BULK_ENTITIES {
        return Err(ApiError::InvalidInput(format!(
            "bulk request contains {} {} entities, maximum is {}",
            entities.len(),
            T::ENTITY_TYPE,
            MAX_BULK_ENTITIES
        )));
    }

    let mut seen = HashSet::with_capacity(entities.len());
    for entity in entities {
        let id = entity.entity_id();
        if !seen.insert(id.clone()) {
            return Err(ApiError::Conflict(format!(
                "duplicate {} id {} in request",
                T::ENTITY_TYPE,
                id
            )));
        }
    }
    Ok(())
}
