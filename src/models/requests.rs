//! Request DTOs
//!
//! Bodies and query strings accepted by the HTTP surface. Metadata create and
//! bulk bodies reuse [`Metadata`](crate::models::Metadata) directly.

use serde::Deserialize;

/// Body for `PUT /entities/:type/:id/metadata/:key`
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMetadataValue {
    pub value: String,
}

/// Body for `DELETE /entities/:type/:id/metadata/bulk`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkDeleteRequest {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Body for `POST /threat_models`. The caller becomes the owner.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateThreatModelRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Query for `GET /cache/patterns`
#[derive(Debug, Clone, Deserialize)]
pub struct PatternQuery {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub parent_type: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}
