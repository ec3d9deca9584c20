//! API Module
//!
//! HTTP handlers and routing for the threat-modeling core. Handlers stay
//! thin: validation lives in the metadata and patch modules, cache upkeep in
//! the cache service and invalidator.

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
