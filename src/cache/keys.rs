//! Cache Key Module
//!
//! Builds the cache key shapes. External monitors and warmers match on these
//! strings, so the formats are fixed:
//!
//! - `cache:<kind>:<id>` for single entities
//! - `cache:metadata:<entityType>:<entityId>` for metadata collections
//! - `cache:list:<entityType>:<parentId>:<offset>:<limit>` for paginated lists

use serde::Serialize;

// == Cache Kind ==
/// Every family of cached value, each with its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    ThreatModel,
    Diagram,
    Threat,
    Document,
    Repository,
    Asset,
    Note,
    Metadata,
    Cells,
    Auth,
    List,
}

impl CacheKind {
    pub const ALL: [CacheKind; 11] = [
        CacheKind::ThreatModel,
        CacheKind::Diagram,
        CacheKind::Threat,
        CacheKind::Document,
        CacheKind::Repository,
        CacheKind::Asset,
        CacheKind::Note,
        CacheKind::Metadata,
        CacheKind::Cells,
        CacheKind::Auth,
        CacheKind::List,
    ];

    /// Key segment for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::ThreatModel => "threat_model",
            CacheKind::Diagram => "diagram",
            CacheKind::Threat => "threat",
            CacheKind::Document => "document",
            CacheKind::Repository => "repository",
            CacheKind::Asset => "asset",
            CacheKind::Note => "note",
            CacheKind::Metadata => "metadata",
            CacheKind::Cells => "cells",
            CacheKind::Auth => "auth",
            CacheKind::List => "list",
        }
    }

    /// Position in [`CacheKind::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Maps an entity type name to the kind its single-entity entry is stored under.
    ///
    /// `source` is an alias of `repository`. Returns `None` for entity types
    /// that have no single-entity cache entry (cells, metadata, ...).
    pub fn for_entity_type(entity_type: &str) -> Option<CacheKind> {
        match entity_type {
            "threat_model" => Some(CacheKind::ThreatModel),
            "diagram" => Some(CacheKind::Diagram),
            "threat" => Some(CacheKind::Threat),
            "document" => Some(CacheKind::Document),
            "repository" | "source" => Some(CacheKind::Repository),
            "asset" => Some(CacheKind::Asset),
            "note" => Some(CacheKind::Note),
            _ => None,
        }
    }
}

// == Key Builders ==
/// `cache:<kind>:<id>`
pub fn entity_key(kind: CacheKind, id: &str) -> String {
    format!("cache:{}:{}", kind.as_str(), id)
}

/// `cache:metadata:<entityType>:<entityId>`
pub fn metadata_key(entity_type: &str, entity_id: &str) -> String {
    format!("cache:metadata:{}:{}", entity_type, entity_id)
}

/// `cache:cells:<diagramId>`
pub fn cells_key(diagram_id: &str) -> String {
    format!("cache:cells:{}", diagram_id)
}

/// `cache:auth:<threatModelId>`
pub fn auth_key(threat_model_id: &str) -> String {
    format!("cache:auth:{}", threat_model_id)
}

/// `cache:list:<entityType>:<parentId>:<offset>:<limit>`
pub fn list_key(entity_type: &str, parent_id: &str, offset: usize, limit: usize) -> String {
    format!("cache:list:{}:{}:{}:{}", entity_type, parent_id, offset, limit)
}

/// Scan pattern matching every page of one collection: `cache:list:<entityType>:<parentId>:*`
pub fn list_pattern(entity_type: &str, parent_id: &str) -> String {
    format!("cache:list:{}:{}:*", entity_type, parent_id)
}
