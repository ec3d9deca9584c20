//! Cache Invalidation Module
//!
//! Turns one entity mutation into the full set of cache deletions it implies.
//! The parent/child fan-out is described by a static relationship table, so
//! a new sub-resource kind is one table row instead of a new code path.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::cache::keys::{self, CacheKind};
use crate::cache::CacheService;
use crate::error::CacheResult;

// == Event Types ==
/// When an invalidation runs relative to the triggering request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationStrategy {
    /// Awaited before the caller continues.
    #[default]
    Immediate,
    /// Spawned onto the runtime. No completion signal.
    Async,
    /// Reserved for debouncing; currently runs like `Immediate`.
    WithDelay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    Delete,
    MetadataCreate,
    MetadataUpdate,
    MetadataDelete,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::MetadataCreate => "metadata_create",
            OperationType::MetadataUpdate => "metadata_update",
            OperationType::MetadataDelete => "metadata_delete",
        };
        f.write_str(s)
    }
}

/// One mutation, described for the invalidator. Consumed once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub entity_type: String,
    pub entity_id: String,
    pub parent_type: Option<String>,
    pub parent_id: Option<String>,
    pub operation: OperationType,
    pub strategy: InvalidationStrategy,
}

impl InvalidationEvent {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        operation: OperationType,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            parent_type: None,
            parent_id: None,
            operation,
            strategy: InvalidationStrategy::Immediate,
        }
    }

    pub fn with_parent(mut self, parent_type: impl Into<String>, parent_id: impl Into<String>) -> Self {
        self.parent_type = Some(parent_type.into());
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_strategy(mut self, strategy: InvalidationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Event for a metadata mutation on `(entity_type, entity_id)`.
    ///
    /// The owning entity is the parent, so its metadata collection and its own
    /// cached representation are both dropped.
    pub fn metadata(
        entity_type: &str,
        entity_id: &str,
        key: Option<&str>,
        operation: OperationType,
    ) -> Self {
        let id = match key {
            Some(key) => format!("{}:{}:{}", entity_type, entity_id, key),
            None => format!("{}:{}", entity_type, entity_id),
        };
        Self::new(METADATA_EVENT_TYPE, id, operation).with_parent(entity_type, entity_id)
    }

    fn parent(&self) -> Option<(&str, &str)> {
        match (self.parent_type.as_deref(), self.parent_id.as_deref()) {
            (Some(t), Some(id)) if !t.is_empty() && !id.is_empty() => Some((t, id)),
            _ => None,
        }
    }
}

// == Relationship Table ==
/// Entity type of events raised by metadata writes.
const METADATA_EVENT_TYPE: &str = "metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParentLink {
    /// Parent threat model entry and its authorization data.
    ThreatModel,
    /// Parent diagram entry and its cell collection.
    Diagram,
    /// Whatever entity owns the metadata: its metadata collection and its own entry.
    MetadataOwner,
}

struct Relationship {
    entity_types: &'static [&'static str],
    parent: ParentLink,
    /// Paginated list collection under the parent, if any.
    list_collection: Option<&'static str>,
}

const RELATIONSHIPS: &[Relationship] = &[
    Relationship {
        entity_types: &["threat"],
        parent: ParentLink::ThreatModel,
        list_collection: Some("threats"),
    },
    Relationship {
        entity_types: &["document"],
        parent: ParentLink::ThreatModel,
        list_collection: Some("documents"),
    },
    Relationship {
        entity_types: &["source", "repository"],
        parent: ParentLink::ThreatModel,
        list_collection: Some("sources"),
    },
    Relationship {
        entity_types: &["asset"],
        parent: ParentLink::ThreatModel,
        list_collection: Some("assets"),
    },
    Relationship {
        entity_types: &["note"],
        parent: ParentLink::ThreatModel,
        list_collection: Some("notes"),
    },
    Relationship {
        entity_types: &["cell"],
        parent: ParentLink::Diagram,
        list_collection: None,
    },
    Relationship {
        entity_types: &[METADATA_EVENT_TYPE],
        parent: ParentLink::MetadataOwner,
        list_collection: None,
    },
];

fn relationship_for(entity_type: &str) -> Option<&'static Relationship> {
    RELATIONSHIPS
        .iter()
        .find(|r| r.entity_types.contains(&entity_type))
}

/// List collections that hang off a threat model.
fn threat_model_collections() -> impl Iterator<Item = &'static str> {
    RELATIONSHIPS
        .iter()
        .filter(|r| r.parent == ParentLink::ThreatModel)
        .filter_map(|r| r.list_collection)
}

// == Invalidation Plan ==
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Entity { entity_type: String, entity_id: String },
    Metadata { entity_type: String, entity_id: String },
    Auth(String),
    Cells(String),
    Lists { collection: &'static str, parent_id: String },
}

impl Step {
    fn entity(entity_type: &str, entity_id: &str) -> Self {
        Step::Entity {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
        }
    }

    fn metadata(entity_type: &str, entity_id: &str) -> Self {
        Step::Metadata {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
        }
    }

    /// Key or scan pattern this step deletes. `None` when nothing is cached for it.
    fn pattern(&self) -> Option<String> {
        match self {
            Step::Entity {
                entity_type,
                entity_id,
            } => CacheKind::for_entity_type(entity_type).map(|kind| keys::entity_key(kind, entity_id)),
            Step::Metadata {
                entity_type,
                entity_id,
            } => Some(keys::metadata_key(entity_type, entity_id)),
            Step::Auth(id) => Some(keys::auth_key(id)),
            Step::Cells(id) => Some(keys::cells_key(id)),
            Step::Lists {
                collection,
                parent_id,
            } => Some(keys::list_pattern(collection, parent_id)),
        }
    }
}

/// Every step a single event expands into, in execution order.
fn plan(event: &InvalidationEvent) -> Vec<Step> {
    let mut steps = Vec::new();
    // Metadata events have no cached entry of their own; the owner's are the targets.
    if event.entity_type != METADATA_EVENT_TYPE {
        steps.push(Step::entity(&event.entity_type, &event.entity_id));
        steps.push(Step::metadata(&event.entity_type, &event.entity_id));
    }

    let Some(rel) = relationship_for(&event.entity_type) else {
        debug!("No specific invalidation rules for entity type {}", event.entity_type);
        return steps;
    };

    let Some((parent_type, parent_id)) = event.parent() else {
        debug!(
            "Event {}:{} has no parent, skipping fan-out",
            event.entity_type, event.entity_id
        );
        return steps;
    };

    match rel.parent {
        ParentLink::ThreatModel if parent_type == "threat_model" => {
            steps.push(Step::entity("threat_model", parent_id));
            steps.push(Step::Auth(parent_id.to_string()));
            steps.extend(list_step(rel, parent_id));
        }
        ParentLink::Diagram if parent_type == "diagram" => {
            steps.push(Step::entity("diagram", parent_id));
            steps.push(Step::Cells(parent_id.to_string()));
            steps.extend(list_step(rel, parent_id));
        }
        ParentLink::MetadataOwner => {
            steps.push(Step::metadata(parent_type, parent_id));
            steps.push(Step::entity(parent_type, parent_id));
        }
        _ => debug!(
            "Parent type {} does not match the rules for {}, skipping fan-out",
            parent_type, event.entity_type
        ),
    }

    steps
}

fn list_step(rel: &Relationship, parent_id: &str) -> Option<Step> {
    rel.list_collection.map(|collection| Step::Lists {
        collection,
        parent_id: parent_id.to_string(),
    })
}

// == Cache Invalidator ==
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<CacheService>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<CacheService>) -> Self {
        Self { cache }
    }

    /// Invalidates every entry that depends on the mutated entity.
    ///
    /// Every step is attempted even when an earlier one fails; the first error
    /// is returned for diagnostics. `Async` returns `Ok` immediately.
    pub async fn invalidate_sub_resource_change(&self, event: InvalidationEvent) -> CacheResult<()> {
        debug!(
            "Processing cache invalidation event: {} {}:{} (parent: {:?}:{:?})",
            event.operation, event.entity_type, event.entity_id, event.parent_type, event.parent_id
        );

        match event.strategy {
            InvalidationStrategy::Immediate | InvalidationStrategy::WithDelay => {
                self.run_event(&event).await
            }
            InvalidationStrategy::Async => {
                let invalidator = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = invalidator.run_event(&event).await {
                        error!(
                            "Async cache invalidation failed for {}:{}: {}",
                            event.entity_type, event.entity_id, e
                        );
                    }
                });
                Ok(())
            }
        }
    }

    /// Drops the threat model, its auth data and every sub-resource list under it.
    pub async fn invalidate_all_related_caches(&self, threat_model_id: &str) -> CacheResult<()> {
        debug!("Performing comprehensive cache invalidation for threat model {}", threat_model_id);

        let mut steps = vec![
            Step::entity("threat_model", threat_model_id),
            Step::Auth(threat_model_id.to_string()),
        ];
        steps.extend(threat_model_collections().map(|collection| Step::Lists {
            collection,
            parent_id: threat_model_id.to_string(),
        }));

        self.run_steps(&steps).await
    }

    /// Drops the cached auth data and threat model after an owner or authorization change.
    pub async fn invalidate_permission_related_caches(&self, threat_model_id: &str) -> CacheResult<()> {
        debug!("Invalidating permission-related caches for threat model {}", threat_model_id);
        let steps = [
            Step::Auth(threat_model_id.to_string()),
            Step::entity("threat_model", threat_model_id),
        ];
        self.run_steps(&steps).await
    }

    /// Runs Immediate and WithDelay events in order, then spawns all Async
    /// events as one background batch.
    pub async fn bulk_invalidate(&self, events: Vec<InvalidationEvent>) -> CacheResult<()> {
        debug!("Processing bulk cache invalidation for {} events", events.len());

        let (deferred, inline): (Vec<_>, Vec<_>) = events
            .into_iter()
            .partition(|e| e.strategy == InvalidationStrategy::Async);

        let mut first_error = None;
        for event in &inline {
            if let Err(e) = self.run_event(event).await {
                error!(
                    "Failed to process invalidation event {}:{}: {}",
                    event.entity_type, event.entity_id, e
                );
                first_error.get_or_insert(e);
            }
        }

        if !deferred.is_empty() {
            let invalidator = self.clone();
            tokio::spawn(async move {
                for event in &deferred {
                    if let Err(e) = invalidator.run_event(event).await {
                        error!(
                            "Failed to process async invalidation event {}:{}: {}",
                            event.entity_type, event.entity_id, e
                        );
                    }
                }
            });
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Keys and `cache:list:...:*` patterns a change to this entity would touch.
    pub fn get_invalidation_pattern(
        &self,
        entity_type: &str,
        entity_id: &str,
        parent_type: Option<&str>,
        parent_id: Option<&str>,
    ) -> Vec<String> {
        let mut event = InvalidationEvent::new(entity_type, entity_id, OperationType::Update);
        if let (Some(t), Some(id)) = (parent_type, parent_id) {
            event = event.with_parent(t, id);
        }
        plan(&event).iter().filter_map(Step::pattern).collect()
    }

    // == Execution ==
    async fn run_event(&self, event: &InvalidationEvent) -> CacheResult<()> {
        self.run_steps(&plan(event)).await
    }

    async fn run_steps(&self, steps: &[Step]) -> CacheResult<()> {
        let mut first_error = None;
        for step in steps {
            if let Err(e) = self.run_step(step).await {
                error!("Cache invalidation step {:?} failed: {}", step, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn run_step(&self, step: &Step) -> CacheResult<()> {
        match step {
            Step::Entity {
                entity_type,
                entity_id,
            } => self.cache.invalidate_entity(entity_type, entity_id).await,
            Step::Metadata {
                entity_type,
                entity_id,
            } => self.cache.invalidate_metadata(entity_type, entity_id).await,
            Step::Auth(id) => self.cache.invalidate_auth_data(id).await,
            Step::Cells(id) => self.cache.invalidate_cells(id).await,
            Step::Lists {
                collection,
                parent_id,
            } => self
                .cache
                .invalidate_list_pattern(collection, parent_id)
                .await
                .map(|_| ()),
        }
    }
}
