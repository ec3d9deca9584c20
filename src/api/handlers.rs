//! API Handlers
//!
//! HTTP request handlers for the metadata, threat model and cache endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::cache::{entity_key, CacheClient, CacheInvalidator, CacheKind, CacheService};
use crate::config::CacheTtls;
use crate::error::{ApiError, Result};
use crate::metadata::{MemoryMetadataStore, MetadataStore};
use crate::models::{
    BulkDeleteRequest, BulkResponse, CacheStatsResponse, CreateThreatModelRequest, HealthResponse,
    InvalidationPatternResponse, Metadata, MetadataEntry, PatternQuery, Role, ThreatModel,
    UpdateMetadataValue,
};
use crate::patch::{check_ownership_changes, PatchOperation, PatchPipeline};
use crate::store::{EntityStore, MemoryEntityStore};

/// Header carrying the authenticated principal. Authentication itself happens
/// upstream of this service.
pub const USER_HEADER: &str = "x-user";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheService>,
    pub invalidator: CacheInvalidator,
    pub metadata: Arc<dyn MetadataStore>,
    pub threat_models: Arc<dyn EntityStore<ThreatModel>>,
}

impl AppState {
    /// Wires in-memory stores behind a cache service on `client`.
    pub fn new(client: Arc<dyn CacheClient>, ttls: CacheTtls) -> Self {
        let cache = Arc::new(CacheService::new(client, ttls));
        let invalidator = CacheInvalidator::new(cache.clone());
        let metadata = Arc::new(MemoryMetadataStore::with_cache(
            cache.clone(),
            invalidator.clone(),
        ));
        Self::with_stores(cache, metadata, Arc::new(MemoryEntityStore::new()))
    }

    /// Uses caller-provided stores, e.g. a database-backed adapter.
    pub fn with_stores(
        cache: Arc<CacheService>,
        metadata: Arc<dyn MetadataStore>,
        threat_models: Arc<dyn EntityStore<ThreatModel>>,
    ) -> Self {
        Self {
            invalidator: CacheInvalidator::new(cache.clone()),
            cache,
            metadata,
            threat_models,
        }
    }
}

fn principal(headers: &HeaderMap) -> Result<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Forbidden(format!("missing {} header", USER_HEADER)))
}

// == Service Endpoints ==
/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache_ok = match state.cache.client().ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Cache ping failed: {}", e);
            false
        }
    };
    Json(HealthResponse::from_ping(cache_ok))
}

/// Handler for GET /cache/stats
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let backend = state.cache.backend_stats().await;
    Json(CacheStatsResponse::new(backend, state.cache.metrics()))
}

/// Handler for GET /cache/patterns
///
/// Reports which keys and list patterns a change to the entity would touch.
pub async fn cache_patterns_handler(
    State(state): State<AppState>,
    Query(query): Query<PatternQuery>,
) -> Json<InvalidationPatternResponse> {
    let patterns = state.invalidator.get_invalidation_pattern(
        &query.entity_type,
        &query.entity_id,
        query.parent_type.as_deref(),
        query.parent_id.as_deref(),
    );
    Json(InvalidationPatternResponse {
        entity_type: query.entity_type,
        entity_id: query.entity_id,
        patterns,
    })
}

// == Metadata Endpoints ==
/// Handler for GET /entities/:entity_type/:entity_id/metadata
pub async fn list_metadata_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Json<Vec<Metadata>>> {
    let entries = state.metadata.list(&entity_type, &entity_id).await?;
    Ok(Json(entries))
}

/// Handler for POST /entities/:entity_type/:entity_id/metadata
///
/// Strict create; an existing key is a conflict.
pub async fn create_metadata_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Json(metadata): Json<Metadata>,
) -> Result<(StatusCode, Json<Metadata>)> {
    let created = state
        .metadata
        .create(&entity_type, &entity_id, metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Handler for GET /entities/:entity_type/:entity_id/metadata/:key
pub async fn get_metadata_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id, key)): Path<(String, String, String)>,
) -> Result<Json<Metadata>> {
    let metadata = state.metadata.get(&entity_type, &entity_id, &key).await?;
    Ok(Json(metadata))
}

/// Handler for PUT /entities/:entity_type/:entity_id/metadata/:key
pub async fn update_metadata_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id, key)): Path<(String, String, String)>,
    Json(body): Json<UpdateMetadataValue>,
) -> Result<Json<Metadata>> {
    let updated = state
        .metadata
        .update(&entity_type, &entity_id, Metadata::new(key, body.value))
        .await?;
    Ok(Json(updated))
}

/// Handler for DELETE /entities/:entity_type/:entity_id/metadata/:key
pub async fn delete_metadata_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id, key)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    state.metadata.delete(&entity_type, &entity_id, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /entities/:entity_type/:entity_id/metadata/bulk
pub async fn bulk_create_metadata_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Json(entries): Json<Vec<Metadata>>,
) -> Result<(StatusCode, Json<Vec<Metadata>>)> {
    let created = state
        .metadata
        .bulk_create(&entity_type, &entity_id, entries)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Handler for PUT /entities/:entity_type/:entity_id/metadata/bulk
pub async fn bulk_update_metadata_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Json(entries): Json<Vec<Metadata>>,
) -> Result<Json<Vec<Metadata>>> {
    let updated = state
        .metadata
        .bulk_update(&entity_type, &entity_id, entries)
        .await?;
    Ok(Json(updated))
}

/// Handler for DELETE /entities/:entity_type/:entity_id/metadata/bulk
pub async fn bulk_delete_metadata_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<BulkResponse>> {
    let count = state
        .metadata
        .bulk_delete(&entity_type, &entity_id, &body.keys)
        .await?;
    Ok(Json(BulkResponse { count }))
}

/// Handler for GET /metadata/keys/:key
pub async fn metadata_by_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Vec<MetadataEntry>>> {
    let entries = state.metadata.get_by_key(&key).await?;
    Ok(Json(entries))
}

// == Threat Model Endpoints ==
/// Handler for POST /threat_models
///
/// The caller becomes the owner.
pub async fn create_threat_model_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateThreatModelRequest>,
) -> Result<(StatusCode, Json<ThreatModel>)> {
    let owner = principal(&headers)?;
    let mut threat_model = ThreatModel::new(body.name, owner);
    threat_model.description = body.description;

    let created = state.threat_models.create(threat_model).await?;
    if let Err(e) = state.cache.cache_threat_model(&created).await {
        warn!("Failed to cache new threat model {}: {}", created.id, e);
    }
    info!("Created threat model {}", created.id);
    Ok((StatusCode::CREATED, Json(created)))
}

/// Handler for GET /threat_models/:id
///
/// Cache-aside read: a cache outage degrades to a store read.
pub async fn get_threat_model_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ThreatModel>> {
    let key = entity_key(CacheKind::ThreatModel, &id);
    let store = state.threat_models.clone();
    let threat_model = state
        .cache
        .get_or_fetch(CacheKind::ThreatModel, &key, || async move {
            store.get(&id).await.map_err(ApiError::from)
        })
        .await?;
    Ok(Json(threat_model))
}

/// Handler for PATCH /threat_models/:id
///
/// Authorizes against the stored model (writer or owner), applies the
/// operations, keeps the identity fields, persists, then invalidates. A change to owner or
/// authorization drops every cache that depends on permissions.
pub async fn patch_threat_model_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(operations): Json<Vec<PatchOperation>>,
) -> Result<Json<ThreatModel>> {
    let actor = principal(&headers)?;
    let original = state.threat_models.get(&id).await?;
    let role = original
        .role_of(&actor)
        .ok_or_else(|| ApiError::Forbidden(format!("{} has no access to threat model {}", actor, id)))?;
    if role < Role::Writer {
        return Err(ApiError::Forbidden(format!(
            "{} has read-only access to threat model {}",
            actor, id
        )));
    }

    let pipeline = PatchPipeline::new(|mut patched: ThreatModel, original: &ThreatModel| {
        patched.id = original.id;
        patched.created_at = original.created_at;
        patched.modified_at = Utc::now();
        patched
    })
    .with_validator(|_: &ThreatModel, patched: &ThreatModel, _: &str| {
        if patched.name.trim().is_empty() {
            return Err("name cannot be empty".to_string());
        }
        if patched.owner.trim().is_empty() {
            return Err("owner cannot be empty".to_string());
        }
        Ok(())
    });
    let patched = pipeline.run(&original, &operations, role, &actor)?;

    let saved = state.threat_models.update(patched).await?;

    let (owner_changed, auth_changed) = check_ownership_changes(&operations);
    let tm_id = saved.id.to_string();
    let invalidation = if owner_changed || auth_changed {
        info!(
            "Ownership or authorization of threat model {} changed by {}",
            tm_id, actor
        );
        state.invalidator.invalidate_permission_related_caches(&tm_id).await
    } else {
        state.invalidator.invalidate_all_related_caches(&tm_id).await
    };
    if let Err(e) = invalidation {
        warn!("Cache invalidation after patching {} failed: {}", tm_id, e);
    }

    Ok(Json(saved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::{Authorization, Role};
    use serde_json::json;

    fn test_state() -> AppState {
        AppState::new(Arc::new(MemoryCache::new(100)), CacheTtls::default())
    }

    fn headers_for(user: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, user.parse().unwrap());
        headers
    }

    async fn seeded_model(state: &AppState) -> ThreatModel {
        let mut tm = ThreatModel::new("Payments", "alice");
        tm.authorization.push(Authorization::new("bob", Role::Writer));
        state.threat_models.create(tm).await.unwrap()
    }

    #[tokio::test]
    async fn test_metadata_create_then_list() {
        let state = test_state();
        let path = Path(("threat".to_string(), "T1".to_string()));
        let (status, _) = create_metadata_handler(
            State(state.clone()),
            path,
            Json(Metadata::new("severity", "high")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(entries) = list_metadata_handler(
            State(state),
            Path(("threat".to_string(), "T1".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(entries, vec![Metadata::new("severity", "high")]);
    }

    #[tokio::test]
    async fn test_get_threat_model_populates_cache() {
        let state = test_state();
        let tm = seeded_model(&state).await;
        let id = tm.id.to_string();

        let Json(fetched) = get_threat_model_handler(State(state.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(fetched, tm);
        assert_eq!(
            state.cache.get_cached_threat_model(&id).await.unwrap(),
            Some(tm)
        );
    }

    #[tokio::test]
    async fn test_get_missing_threat_model() {
        let state = test_state();
        let result = get_threat_model_handler(State(state), Path("missing".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_patch_by_writer_updates_name_and_drops_cache() {
        let state = test_state();
        let tm = seeded_model(&state).await;
        let id = tm.id.to_string();
        state.cache.cache_threat_model(&tm).await.unwrap();

        let Json(patched) = patch_threat_model_handler(
            State(state.clone()),
            Path(id.clone()),
            headers_for("bob"),
            Json(vec![PatchOperation::replace("/name", json!("Checkout"))]),
        )
        .await
        .unwrap();

        assert_eq!(patched.name, "Checkout");
        assert_eq!(patched.id, tm.id);
        assert_eq!(patched.created_at, tm.created_at);
        assert_eq!(state.cache.get_cached_threat_model(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_patch_owner_by_writer_is_forbidden() {
        let state = test_state();
        let tm = seeded_model(&state).await;

        let result = patch_threat_model_handler(
            State(state.clone()),
            Path(tm.id.to_string()),
            headers_for("bob"),
            Json(vec![PatchOperation::replace("/owner", json!("bob"))]),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));

        let stored = state.threat_models.get(&tm.id.to_string()).await.unwrap();
        assert_eq!(stored.owner, "alice");
    }

    #[tokio::test]
    async fn test_patch_without_access_is_forbidden() {
        let state = test_state();
        let tm = seeded_model(&state).await;

        let result = patch_threat_model_handler(
            State(state),
            Path(tm.id.to_string()),
            headers_for("mallory"),
            Json(vec![PatchOperation::replace("/name", json!("x"))]),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_patch_by_reader_is_forbidden() {
        let state = test_state();
        let mut tm = ThreatModel::new("Payments", "alice");
        tm.authorization.push(Authorization::new("rita", Role::Reader));
        let tm = state.threat_models.create(tm).await.unwrap();
        let id = tm.id.to_string();

        let result = patch_threat_model_handler(
            State(state.clone()),
            Path(id.clone()),
            headers_for("rita"),
            Json(vec![PatchOperation::replace("/name", json!("Renamed"))]),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));

        let stored = state.threat_models.get(&id).await.unwrap();
        assert_eq!(stored.name, "Payments");
        assert_eq!(stored.modified_at, tm.modified_at);
    }

    #[tokio::test]
    async fn test_patch_rejects_empty_name() {
        let state = test_state();
        let tm = seeded_model(&state).await;

        let result = patch_threat_model_handler(
            State(state),
            Path(tm.id.to_string()),
            headers_for("alice"),
            Json(vec![PatchOperation::replace("/name", json!("  "))]),
        )
        .await;
        assert!(matches!(result, Err(ApiError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let Json(response) = health_handler(State(test_state())).await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.cache, "ok");
    }

    #[tokio::test]
    async fn test_cache_patterns_handler() {
        let query = PatternQuery {
            entity_type: "threat".to_string(),
            entity_id: "T1".to_string(),
            parent_type: Some("threat_model".to_string()),
            parent_id: Some("TM1".to_string()),
        };
        let Json(response) = cache_patterns_handler(State(test_state()), Query(query)).await;
        assert!(response.patterns.contains(&"cache:threat:T1".to_string()));
        assert!(response
            .patterns
            .contains(&"cache:list:threats:TM1:*".to_string()));
    }
}
