//! In-process back-end
//!
//! Documents live in an ordered map keyed by namespace-qualified keys, so
//! several namespaces can share one [`MemoryDatabase`] and pattern queries
//! return matches in key order.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use tracing::debug;

use super::{validate_id, DataStore, Document, DocumentStream};
use crate::{Key, PagingResult, Pattern, Result, StoreError};

/// Shared in-memory storage, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    entries: Arc<RwLock<BTreeMap<Key, Document>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents across all namespaces
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// In-memory document store scoped to one namespace
pub struct InMemoryStore {
    db: MemoryDatabase,
    namespace: Key,
}

impl InMemoryStore {
    /// Create a store over its own private database
    pub fn new(namespace: Key) -> Self {
        Self::with_database(MemoryDatabase::new(), namespace)
    }

    /// Create a store over a database possibly shared with other namespaces
    pub fn with_database(db: MemoryDatabase, namespace: Key) -> Self {
        Self { db, namespace }
    }

    pub fn namespace(&self) -> &Key {
        &self.namespace
    }

    fn full_key(&self, id: &Key) -> Key {
        self.namespace.compose(id)
    }

    fn is_match(&self, full_key: &Key, patterns: &[Pattern]) -> Option<Key> {
        full_key
            .strip_prefix(&self.namespace)
            .filter(|id| id.matches_any(patterns))
    }

    /// Matches in key order, snapshotted under one read lock
    fn matches(&self, patterns: &[Pattern]) -> Vec<(Key, Document)> {
        if Pattern::none_matchable(patterns) {
            return Vec::new();
        }
        let entries = self.db.entries.read();
        entries
            .range(self.namespace.clone()..)
            .take_while(|(key, _)| key.starts_with(&self.namespace))
            .filter_map(|(key, value)| {
                self.is_match(key, patterns)
                    .map(|id| (id, value.clone()))
            })
            .collect()
    }
}

#[async_trait]
impl DataStore<Key, Document> for InMemoryStore {
    async fn create(&self, id: Key, data: Document) -> Result<Document> {
        validate_id(&id)?;
        let mut entries = self.db.entries.write();
        let key = self.full_key(&id);
        if entries.contains_key(&key) {
            return Err(StoreError::AlreadyExists(id));
        }
        debug!(namespace = %self.namespace, id = %id, "Creating document");
        entries.insert(key, data.clone());
        Ok(data)
    }

    async fn update(&self, old_id: Key, id: Key, data: Document) -> Result<Document> {
        validate_id(&id)?;
        if old_id == id {
            debug!(namespace = %self.namespace, id = %id, "Updating document");
            self.db.entries.write().insert(self.full_key(&id), data.clone());
            return Ok(data);
        }
        debug!(namespace = %self.namespace, old_id = %old_id, id = %id, "Moving document");
        self.delete(old_id).await?;
        self.create(id, data).await
    }

    async fn delete(&self, id: Key) -> Result<Document> {
        let removed = self.db.entries.write().remove(&self.full_key(&id));
        match removed {
            Some(value) => {
                debug!(namespace = %self.namespace, id = %id, "Deleted document");
                Ok(value)
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn delete_all(&self, patterns: &[Pattern]) -> Result<()> {
        if Pattern::none_matchable(patterns) {
            return Ok(());
        }
        let mut entries = self.db.entries.write();
        let before = entries.len();
        entries.retain(|key, _| self.is_match(key, patterns).is_none());
        debug!(
            namespace = %self.namespace,
            removed = before - entries.len(),
            "Deleted matching documents"
        );
        Ok(())
    }

    async fn get_by_id(&self, id: &Key) -> Result<Option<Document>> {
        Ok(self.db.entries.read().get(&self.full_key(id)).cloned())
    }

    fn get_by_id_like(&self, patterns: &[Pattern]) -> DocumentStream<Key, Document> {
        stream::iter(self.matches(patterns).into_iter().map(Ok)).boxed()
    }

    async fn get_by_id_like_paged(
        &self,
        patterns: &[Pattern],
        page: usize,
        page_size: usize,
    ) -> Result<PagingResult<(Key, Document)>> {
        PagingResult::from_matches(self.matches(patterns), page, page_size)
    }

    async fn count(&self, patterns: &[Pattern]) -> Result<usize> {
        Ok(self.matches(patterns).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;

    fn key(raw: &str) -> Key {
        Key::parse(raw)
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = InMemoryStore::new(key("cfg"));
        let created = store.create(key("a:b"), json!({"v": 1})).await.unwrap();
        assert_eq!(created, json!({"v": 1}));
        assert_eq!(store.get_by_id(&key("a:b")).await.unwrap(), Some(json!({"v": 1})));
        assert_eq!(store.get_by_id(&key("a:c")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_existing_keeps_value() {
        let store = InMemoryStore::new(key("cfg"));
        store.create(key("a"), json!(1)).await.unwrap();
        let err = store.create(key("a"), json!(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(ref id) if *id == key("a")));
        assert_eq!(store.get_by_id(&key("a")).await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_id() {
        let store = InMemoryStore::new(key("cfg"));
        let err = store.create(Key::empty(), json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new(key("cfg"));
        store.create(key("a"), json!(1)).await.unwrap();
        assert_eq!(store.delete(key("a")).await.unwrap(), json!(1));
        assert_eq!(store.get_by_id(&key("a")).await.unwrap(), None);
        assert!(matches!(
            store.delete(key("a")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_in_place_creates_when_missing() {
        let store = InMemoryStore::new(key("cfg"));
        store.update(key("a"), key("a"), json!(1)).await.unwrap();
        store.update(key("a"), key("a"), json!(2)).await.unwrap();
        assert_eq!(store.get_by_id(&key("a")).await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_update_moves_document() {
        let store = InMemoryStore::new(key("cfg"));
        store.create(key("a"), json!(1)).await.unwrap();
        store.update(key("a"), key("b"), json!(2)).await.unwrap();
        assert_eq!(store.get_by_id(&key("a")).await.unwrap(), None);
        assert_eq!(store.get_by_id(&key("b")).await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_update_move_from_missing_fails() {
        let store = InMemoryStore::new(key("cfg"));
        let err = store.update(key("a"), key("b"), json!(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.get_by_id(&key("b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_namespaces_share_database() {
        let db = MemoryDatabase::new();
        let configs = InMemoryStore::with_database(db.clone(), key("cfg"));
        let apikeys = InMemoryStore::with_database(db.clone(), key("apikeys"));

        configs.create(key("a"), json!("config")).await.unwrap();
        apikeys.create(key("a"), json!("apikey")).await.unwrap();

        assert_eq!(db.len(), 2);
        assert_eq!(configs.get_by_id(&key("a")).await.unwrap(), Some(json!("config")));
        assert_eq!(configs.count(&[Pattern::parse("*")]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_by_id_like_in_key_order() {
        let store = InMemoryStore::new(key("cfg"));
        for id in ["a:c:x", "a:b:y", "a:b:x"] {
            store.create(key(id), json!(id)).await.unwrap();
        }
        let ids: Vec<String> = store
            .get_by_id_like(&[Pattern::parse("a:*:*")])
            .map_ok(|(id, _)| id.to_string())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec!["a:b:x", "a:b:y", "a:c:x"]);
    }

    #[tokio::test]
    async fn test_delete_all_stays_in_namespace() {
        let db = MemoryDatabase::new();
        let configs = InMemoryStore::with_database(db.clone(), key("cfg"));
        let other = InMemoryStore::with_database(db.clone(), key("other"));
        configs.create(key("a:x"), json!(1)).await.unwrap();
        configs.create(key("b:x"), json!(2)).await.unwrap();
        other.create(key("a:x"), json!(3)).await.unwrap();

        configs.delete_all(&[Pattern::parse("a:*")]).await.unwrap();

        assert_eq!(configs.get_by_id(&key("a:x")).await.unwrap(), None);
        assert_eq!(configs.get_by_id(&key("b:x")).await.unwrap(), Some(json!(2)));
        assert_eq!(other.get_by_id(&key("a:x")).await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_paged_rejects_page_zero() {
        let store = InMemoryStore::new(key("cfg"));
        let err = store
            .get_by_id_like_paged(&[Pattern::parse("*")], 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
