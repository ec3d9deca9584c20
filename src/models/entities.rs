//! Entity models
//!
//! The threat-modeling entities that flow through the cache, patch and
//! metadata layers. Serialized field names are snake_case JSON.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CacheKind;

// == Entity Trait ==
/// Common surface for entities that are persisted and cached as a unit.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Entity type name used in invalidation events and metadata triples.
    const ENTITY_TYPE: &'static str;
    /// Cache kind the single-entity entry is stored under.
    const CACHE_KIND: CacheKind;

    fn entity_id(&self) -> String;

    /// Owning threat model, for sub-resources.
    fn parent_id(&self) -> Option<String> {
        None
    }
}

// == Roles and Authorization ==
/// Access role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Writer,
    Owner,
}

/// One principal's grant on a threat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub principal: String,
    pub role: Role,
}

impl Authorization {
    pub fn new(principal: impl Into<String>, role: Role) -> Self {
        Self {
            principal: principal.into(),
            role,
        }
    }
}

/// Authorization snapshot cached per threat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationData {
    #[serde(rename = "type")]
    pub auth_type: String,
    pub owner: String,
    pub authorization: Vec<Authorization>,
}

impl AuthorizationData {
    pub const TYPE: &'static str = "tmi-1.0";

    /// Highest role `principal` holds. The owner is always Owner.
    pub fn role_of(&self, principal: &str) -> Option<Role> {
        if self.owner == principal {
            return Some(Role::Owner);
        }
        self.authorization
            .iter()
            .filter(|a| a.principal == principal)
            .map(|a| a.role)
            .max()
    }
}

// == Metadata ==
/// One key/value annotation attached to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub key: String,
    pub value: String,
}

impl Metadata {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A metadata value together with the entity that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub key: String,
    pub value: String,
}

// == Threat Model ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatModel {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner: String,
    #[serde(default)]
    pub authorization: Vec<Authorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_uri: Option<String>,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ThreatModel {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            owner: owner.into(),
            authorization: Vec::new(),
            issue_uri: None,
            metadata: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn authorization_data(&self) -> AuthorizationData {
        AuthorizationData {
            auth_type: AuthorizationData::TYPE.to_string(),
            owner: self.owner.clone(),
            authorization: self.authorization.clone(),
        }
    }

    pub fn role_of(&self, principal: &str) -> Option<Role> {
        self.authorization_data().role_of(principal)
    }
}

impl Entity for ThreatModel {
    const ENTITY_TYPE: &'static str = "threat_model";
    const CACHE_KIND: CacheKind = CacheKind::ThreatModel;

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

// == Sub-resources ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    pub id: Uuid,
    pub threat_model_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Threat {
    pub fn new(threat_model_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            threat_model_id,
            name: name.into(),
            description: None,
            severity: None,
            status: None,
            created_at: now,
            modified_at: now,
        }
    }
}

impl Entity for Threat {
    const ENTITY_TYPE: &'static str = "threat";
    const CACHE_KIND: CacheKind = CacheKind::Threat;

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn parent_id(&self) -> Option<String> {
        Some(self.threat_model_id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub threat_model_id: Uuid,
    pub name: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Entity for Document {
    const ENTITY_TYPE: &'static str = "document";
    const CACHE_KIND: CacheKind = CacheKind::Document;

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn parent_id(&self) -> Option<String> {
        Some(self.threat_model_id.to_string())
    }
}

/// A source-code repository reference (the `source` sub-resource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub threat_model_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub uri: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub repo_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Entity for Repository {
    const ENTITY_TYPE: &'static str = "repository";
    const CACHE_KIND: CacheKind = CacheKind::Repository;

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn parent_id(&self) -> Option<String> {
        Some(self.threat_model_id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: Uuid,
    pub shape: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    pub id: Uuid,
    pub threat_model_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub cells: Vec<Cell>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Entity for Diagram {
    const ENTITY_TYPE: &'static str = "diagram";
    const CACHE_KIND: CacheKind = CacheKind::Diagram;

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn parent_id(&self) -> Option<String> {
        Some(self.threat_model_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_always_has_owner_role() {
        let mut tm = ThreatModel::new("model", "alice");
        tm.authorization.push(Authorization::new("alice", Role::Reader));
        assert_eq!(tm.role_of("alice"), Some(Role::Owner));
    }

    #[test]
    fn test_highest_grant_wins() {
        let mut tm = ThreatModel::new("model", "alice");
        tm.authorization.push(Authorization::new("bob", Role::Reader));
        tm.authorization.push(Authorization::new("bob", Role::Writer));
        assert_eq!(tm.role_of("bob"), Some(Role::Writer));
        assert_eq!(tm.role_of("carol"), None);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Owner).unwrap();
        assert_eq!(json, "\"owner\"");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let tm = ThreatModel::new("model", "alice");
        let json = serde_json::to_value(&tm).unwrap();
        assert!(json.get("description").is_none());
        assert!(json.get("authorization").is_some());
    }
}
