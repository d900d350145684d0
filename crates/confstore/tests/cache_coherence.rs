// Two nodes sharing a back-end and an event bus keep their caches coherent

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use confstore::{
    CachedStore, DataStore, Document, DocumentStream, EventBus, InMemoryEventBus, InMemoryStore,
    JsonDataStore, Key, MemoryDatabase, PagingResult, Pattern, Result,
};
use serde_json::json;

// Back-end wrapper counting single-document reads
struct CountingStore {
    inner: Arc<JsonDataStore>,
    reads: AtomicUsize,
}

impl CountingStore {
    fn new(inner: Arc<JsonDataStore>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStore<Key, Document> for CountingStore {
    async fn create(&self, id: Key, data: Document) -> Result<Document> {
        self.inner.create(id, data).await
    }

    async fn update(&self, old_id: Key, id: Key, data: Document) -> Result<Document> {
        self.inner.update(old_id, id, data).await
    }

    async fn delete(&self, id: Key) -> Result<Document> {
        self.inner.delete(id).await
    }

    async fn delete_all(&self, patterns: &[Pattern]) -> Result<()> {
        self.inner.delete_all(patterns).await
    }

    async fn get_by_id(&self, id: &Key) -> Result<Option<Document>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_id(id).await
    }

    fn get_by_id_like(&self, patterns: &[Pattern]) -> DocumentStream<Key, Document> {
        self.inner.get_by_id_like(patterns)
    }

    async fn get_by_id_like_paged(
        &self,
        patterns: &[Pattern],
        page: usize,
        page_size: usize,
    ) -> Result<PagingResult<(Key, Document)>> {
        self.inner.get_by_id_like_paged(patterns, page, page_size).await
    }
}

struct Node {
    store: CachedStore,
    backend: Arc<CountingStore>,
}

async fn node(db: &MemoryDatabase, bus: &Arc<InMemoryEventBus>) -> Node {
    let namespace = Key::parse("cfg");
    let backend = Arc::new(CountingStore::new(Arc::new(InMemoryStore::with_database(
        db.clone(),
        namespace.clone(),
    ))));
    let event_bus: Arc<dyn EventBus> = bus.clone();
    let store = CachedStore::start(namespace, backend.clone(), event_bus)
        .await
        .unwrap();
    Node { store, backend }
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_second_node_reads_from_cache() {
    let db = MemoryDatabase::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let a = node(&db, &bus).await;
    let b = node(&db, &bus).await;

    a.store.create(Key::parse("k"), json!({"on": true})).await.unwrap();
    eventually(|| b.store.cached(&Key::parse("k")).is_some()).await;

    let value = b.store.get_by_id(&Key::parse("k")).await.unwrap();
    assert_eq!(value, Some(json!({"on": true})));
    assert_eq!(b.backend.reads(), 0, "cache hit must not reach the back-end");
}

#[tokio::test]
async fn test_move_and_delete_propagate() {
    let db = MemoryDatabase::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let a = node(&db, &bus).await;
    let b = node(&db, &bus).await;

    a.store.create(Key::parse("old"), json!(1)).await.unwrap();
    eventually(|| b.store.cached(&Key::parse("old")).is_some()).await;

    a.store
        .update(Key::parse("old"), Key::parse("new"), json!(2))
        .await
        .unwrap();
    eventually(|| b.store.cached(&Key::parse("new")) == Some(json!(2))).await;
    assert_eq!(b.store.cached(&Key::parse("old")), None);

    a.store.delete(Key::parse("new")).await.unwrap();
    eventually(|| b.store.cached(&Key::parse("new")).is_none()).await;
    assert_eq!(b.store.get_by_id(&Key::parse("new")).await.unwrap(), None);
}

#[tokio::test]
async fn test_delete_all_clears_matching_entries() {
    let db = MemoryDatabase::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let a = node(&db, &bus).await;
    let b = node(&db, &bus).await;

    for id in ["flags:x", "flags:y", "limits:z"] {
        a.store.create(Key::parse(id), json!(id)).await.unwrap();
    }
    eventually(|| b.store.cache_len() == 3).await;

    a.store.delete_all(&[Pattern::parse("flags:*")]).await.unwrap();
    eventually(|| b.store.cache_len() == 1).await;
    assert_eq!(b.store.cached(&Key::parse("limits:z")), Some(json!("limits:z")));
    assert_eq!(b.store.count(&[Pattern::parse("*:*")]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_writer_cache_filled_by_own_event() {
    let db = MemoryDatabase::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let a = node(&db, &bus).await;

    a.store.create(Key::parse("k"), json!(1)).await.unwrap();
    eventually(|| a.store.cached(&Key::parse("k")).is_some()).await;
    assert_eq!(a.store.get_by_id(&Key::parse("k")).await.unwrap(), Some(json!(1)));
    assert_eq!(a.backend.reads(), 0);
}

#[tokio::test]
async fn test_other_namespace_events_ignored() {
    let db = MemoryDatabase::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let a = node(&db, &bus).await;

    let other = CachedStore::start(
        Key::parse("apikeys"),
        Arc::new(InMemoryStore::with_database(db.clone(), Key::parse("apikeys"))),
        bus.clone(),
    )
    .await
    .unwrap();

    other.create(Key::parse("k"), json!("secret")).await.unwrap();
    eventually(|| other.cached(&Key::parse("k")).is_some()).await;

    assert_eq!(a.store.cached(&Key::parse("k")), None);
    assert_eq!(a.store.get_by_id(&Key::parse("k")).await.unwrap(), None);
}
