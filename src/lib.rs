//! Threatcore - caching, invalidation, patching and metadata for a
//! threat-modeling backend
//!
//! Entities are read cache-aside through [`cache::CacheService`], mutations
//! fan out to every dependent key through [`cache::CacheInvalidator`], partial
//! updates run through [`patch::PatchPipeline`], and any entity can carry
//! key/value annotations via [`metadata::MetadataStore`].

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod metadata;
pub mod models;
pub mod patch;
pub mod store;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{CacheInvalidator, CacheService};
pub use config::Config;
pub use error::{ApiError, CacheError};
pub use tasks::spawn_cleanup_task;
