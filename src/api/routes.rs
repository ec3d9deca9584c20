//! API Routes
//!
//! Configures the Axum router with every endpoint of the service.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    bulk_create_metadata_handler, bulk_delete_metadata_handler, bulk_update_metadata_handler,
    cache_patterns_handler, cache_stats_handler, create_metadata_handler,
    create_threat_model_handler, delete_metadata_handler, get_metadata_handler,
    get_threat_model_handler, health_handler, list_metadata_handler, metadata_by_key_handler,
    patch_threat_model_handler, update_metadata_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Liveness plus cache reachability
/// - `GET /cache/stats` - Backend counters and per-kind hit ratios
/// - `GET /cache/patterns` - Keys an entity change would invalidate
/// - `GET|POST /entities/:entity_type/:entity_id/metadata` - List or create
/// - `POST|PUT|DELETE /entities/:entity_type/:entity_id/metadata/bulk` - Bulk writes
/// - `GET|PUT|DELETE /entities/:entity_type/:entity_id/metadata/:key` - Single key
/// - `GET /metadata/keys/:key` - Every entity carrying a key
/// - `POST /threat_models` - Create, caller becomes owner
/// - `GET|PATCH /threat_models/:id` - Cached read and partial update
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/cache/stats", get(cache_stats_handler))
        .route("/cache/patterns", get(cache_patterns_handler))
        .route("/metadata/keys/:key", get(metadata_by_key_handler))
        .route(
            "/entities/:entity_type/:entity_id/metadata",
            get(list_metadata_handler).post(create_metadata_handler),
        )
        .route(
            "/entities/:entity_type/:entity_id/metadata/bulk",
            post(bulk_create_metadata_handler)
                .put(bulk_update_metadata_handler)
                .delete(bulk_delete_metadata_handler),
        )
        .route(
            "/entities/:entity_type/:entity_id/metadata/:key",
            get(get_metadata_handler)
                .put(update_metadata_handler)
                .delete(delete_metadata_handler),
        )
        .route("/threat_models", post(create_threat_model_handler))
        .route(
            "/threat_models/:id",
            get(get_threat_model_handler).patch(patch_threat_model_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
