//! Metadata validation
//!
//! Key format, supported owner types and bulk batch bounds. Every check runs
//! before any write so a rejected batch leaves no partial side effects.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ApiError, Result};
use crate::models::Metadata;

/// Maximum entries in one bulk metadata request.
pub const MAX_BULK_METADATA: usize = 20;

/// Entity kinds that may own metadata.
pub const SUPPORTED_ENTITY_TYPES: &[&str] = &[
    "threat_model",
    "threat",
    "diagram",
    "document",
    "repository",
    "source",
    "note",
    "cell",
    "asset",
];

static METADATA_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._\-:]{1,256}$").expect("Invalid metadata key regex"));

pub fn validate_entity_type(entity_type: &str) -> Result<()> {
    if SUPPORTED_ENTITY_TYPES.contains(&entity_type) {
        Ok(())
    } else {
        Err(ApiError::InvalidInput(format!(
            "unsupported entity type: {}",
            entity_type
        )))
    }
}

/// Owner type must be supported and the id non-empty.
pub fn validate_owner(entity_type: &str, entity_id: &str) -> Result<()> {
    validate_entity_type(entity_type)?;
    if entity_id.trim().is_empty() {
        return Err(ApiError::InvalidInput("entity id cannot be empty".to_string()));
    }
    Ok(())
}

/// 1-256 characters drawn from `[A-Za-z0-9._:-]`.
pub fn validate_metadata_key(key: &str) -> Result<()> {
    if METADATA_KEY_PATTERN.is_match(key) {
        Ok(())
    } else {
        Err(ApiError::InvalidInput(format!(
            "invalid metadata key '{}': must be 1-256 characters of letters, digits, '.', '_', '-' or ':'",
            key
        )))
    }
}

/// Size bound, per-key format, and no duplicate keys within the batch.
pub fn validate_bulk_metadata(entries: &[Metadata]) -> Result<()> {
    check_batch_size(entries.len())?;

    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        validate_metadata_key(&entry.key)?;
        if !seen.insert(entry.key.as_str()) {
            return Err(ApiError::Conflict(format!(
                "duplicate metadata key '{}' in request",
                entry.key
            )));
        }
    }
    Ok(())
}

/// Size bound and per-key format for a bulk delete.
pub fn validate_bulk_keys(keys: &[String]) -> Result<()> {
    check_batch_size(keys.len())?;
    keys.iter().try_for_each(|key| validate_metadata_key(key))
}

fn check_batch_size(len: usize) -> Result<()> {
    if len > MAX_BULK_METADATA {
        return Err(ApiError::InvalidInput(format!(
            "bulk request contains {} entries, maximum is {}",
            len, MAX_BULK_METADATA
        )));
    }
    Ok(())
}
