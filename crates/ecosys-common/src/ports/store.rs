//! Persistent store port
//!
//! The storage backend is opaque: the controller saves serialized blobs keyed by entity type and
//! id, and lists them back at startup.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Entity families written by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Component,
    Allocation,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Component => "component",
            EntityType::Allocation => "allocation",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for persistence backends
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Store a blob, replacing any previous value
    async fn save(&self, entity: EntityType, id: &str, blob: Vec<u8>) -> Result<(), StoreError>;

    /// Load a blob by id
    async fn load(&self, entity: EntityType, id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// List every (id, blob) pair of an entity type
    async fn list(&self, entity: EntityType) -> Result<Vec<(String, Vec<u8>)>, StoreError>;
}

/// Errors from store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// In-memory storage implementation
///
/// Uses DashMap for concurrent access. Useful for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<(EntityType, String), Vec<u8>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs across all entity types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn save(&self, entity: EntityType, id: &str, blob: Vec<u8>) -> Result<(), StoreError> {
        self.entries.insert((entity, id.to_string()), blob);
        Ok(())
    }

    async fn load(&self, entity: EntityType, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .entries
            .get(&(entity, id.to_string()))
            .map(|blob| blob.clone()))
    }

    async fn list(&self, entity: EntityType) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let mut items: Vec<(String, Vec<u8>)> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == entity)
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryStore::new();
        store
            .save(EntityType::Component, "a", b"{}".to_vec())
            .await
            .unwrap();

        let blob = store.load(EntityType::Component, "a").await.unwrap();
        assert_eq!(blob.as_deref(), Some(&b"{}"[..]));
        assert!(store
            .load(EntityType::Allocation, "a")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_entity() {
        let store = InMemoryStore::new();
        store.save(EntityType::Component, "b", vec![2]).await.unwrap();
        store.save(EntityType::Component, "a", vec![1]).await.unwrap();
        store.save(EntityType::Allocation, "current", vec![3]).await.unwrap();

        let components = store.list(EntityType::Component).await.unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].0, "a");
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = InMemoryStore::new();
        store.save(EntityType::Allocation, "current", vec![1]).await.unwrap();
        store.save(EntityType::Allocation, "current", vec![9]).await.unwrap();

        let blob = store.load(EntityType::Allocation, "current").await.unwrap();
        assert_eq!(blob, Some(vec![9]));
    }
}
