//! Domain entities and HTTP DTOs
//!
//! Entities are what the cache, patch and metadata layers operate on; the
//! request and response types only exist at the HTTP boundary.

pub mod entities;
pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use entities::{
    Authorization, AuthorizationData, Cell, Diagram, Document, Entity, Metadata, MetadataEntry,
    Repository, Role, Threat, ThreatModel,
};
pub use requests::{
    BulkDeleteRequest, CreateThreatModelRequest, PatternQuery, UpdateMetadataValue,
};
pub use responses::{
    BulkResponse, CacheStatsResponse, ErrorResponse, HealthResponse, InvalidationPatternResponse,
};
