//! In-memory entity store
//!
//! Reference [`EntityStore`] used by the HTTP surface and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{EntityStore, StoreError, StoreResult};
use crate::models::Entity;

pub struct MemoryEntityStore<T> {
    rows: RwLock<BTreeMap<String, T>>,
}

impl<T: Entity> MemoryEntityStore<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    fn conflict(id: &str) -> StoreError {
        StoreError::Conflict(format!("{} {} already exists", T::ENTITY_TYPE, id))
    }

    fn not_found(id: &str) -> StoreError {
        StoreError::NotFound(format!("{} {}", T::ENTITY_TYPE, id))
    }
}

impl<T: Entity> Default for MemoryEntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> EntityStore<T> for MemoryEntityStore<T> {
    async fn create(&self, entity: T) -> StoreResult<T> {
        let id = entity.entity_id();
        let mut rows = self.rows.write().await;
        if rows.contains_key(&id) {
            return Err(Self::conflict(&id));
        }
        rows.insert(id, entity.clone());
        Ok(entity)
    }

    async fn get(&self, id: &str) -> StoreResult<T> {
        self.rows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn update(&self, entity: T) -> StoreResult<T> {
        let id = entity.entity_id();
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| Self::not_found(&id))?;
        *row = entity.clone();
        Ok(entity)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.rows
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn list(&self, parent_id: Option<&str>, offset: usize, limit: usize) -> StoreResult<Vec<T>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|e| parent_id.map_or(true, |p| e.parent_id().as_deref() == Some(p)))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn bulk_create(&self, entities: Vec<T>) -> StoreResult<Vec<T>> {
        let mut rows = self.rows.write().await;
        if let Some(existing) = entities.iter().find(|e| rows.contains_key(&e.entity_id())) {
            return Err(Self::conflict(&existing.entity_id()));
        }
        for entity in &entities {
            rows.insert(entity.entity_id(), entity.clone());
        }
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Threat, ThreatModel};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_crud() {
        let store = MemoryEntityStore::<ThreatModel>::new();
        let tm = ThreatModel::new("model", "alice");
        let id = tm.id.to_string();

        store.create(tm.clone()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), tm);

        let mut renamed = tm.clone();
        renamed.name = "renamed".to_string();
        store.update(renamed).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().name, "renamed");

        store.delete(&id).await.unwrap();
        assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_create_is_typed_conflict() {
        let store = MemoryEntityStore::<ThreatModel>::new();
        let tm = ThreatModel::new("model", "alice");
        store.create(tm.clone()).await.unwrap();
        assert!(matches!(store.create(tm).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryEntityStore::<ThreatModel>::new();
        let result = store.update(ThreatModel::new("ghost", "alice")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_by_parent_with_paging() {
        let store = MemoryEntityStore::<Threat>::new();
        let parent = Uuid::new_v4();
        let other = Uuid::new_v4();
        let batch: Vec<Threat> = (0..5).map(|i| Threat::new(parent, format!("t{i}"))).collect();
        store.bulk_create(batch).await.unwrap();
        store.create(Threat::new(other, "elsewhere")).await.unwrap();

        let parent_id = parent.to_string();
        assert_eq!(store.list(Some(&parent_id), 0, 10).await.unwrap().len(), 5);
        assert_eq!(store.list(Some(&parent_id), 3, 10).await.unwrap().len(), 2);
        assert_eq!(store.list(None, 0, 100).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_bulk_create_is_all_or_nothing() {
        let store = MemoryEntityStore::<Threat>::new();
        let parent = Uuid::new_v4();
        let existing = Threat::new(parent, "existing");
        store.create(existing.clone()).await.unwrap();

        let result = store
            .bulk_create(vec![Threat::new(parent, "new"), existing])
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(store.list(None, 0, 10).await.unwrap().len(), 1);
    }
}
