//! Document-store contract and back-end adapters
//!
//! Every back-end implements [`DataStore`] with the same semantics, whatever
//! its native query capabilities. Keys handed to and returned from a store
//! are relative to the store's namespace.

pub mod memory;
pub mod scan;

#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;

use crate::{Key, PagingResult, Pattern, Result, StoreError};

/// Documents are opaque JSON values
pub type Document = serde_json::Value;

/// Lazy sequence of `(id, document)` pairs produced by a pattern query
pub type DocumentStream<K, V> = BoxStream<'static, Result<(K, V)>>;

/// Trait for document-store back-ends
#[async_trait]
pub trait DataStore<K, V>: Send + Sync + 'static
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Store `data` at `id`. Fails with `AlreadyExists` if `id` is occupied.
    async fn create(&self, id: K, data: V) -> Result<V>;

    /// Overwrite `id` when `old_id == id`; otherwise delete `old_id` then
    /// create `id`. The move is not atomic: a failure between the two steps
    /// leaves the document at neither key.
    async fn update(&self, old_id: K, id: K, data: V) -> Result<V>;

    /// Remove `id` and return its document. Fails with `NotFound` if missing.
    async fn delete(&self, id: K) -> Result<V>;

    /// Remove every document matching any pattern. Not atomic.
    async fn delete_all(&self, patterns: &[Pattern]) -> Result<()>;

    async fn get_by_id(&self, id: &K) -> Result<Option<V>>;

    /// Every document whose id matches any pattern. Each call starts a new
    /// enumeration.
    fn get_by_id_like(&self, patterns: &[Pattern]) -> DocumentStream<K, V>;

    /// One 1-indexed page of matches; `count` is the total across all pages.
    async fn get_by_id_like_paged(
        &self,
        patterns: &[Pattern],
        page: usize,
        page_size: usize,
    ) -> Result<PagingResult<(K, V)>>;

    /// Total number of matches
    async fn count(&self, patterns: &[Pattern]) -> Result<usize> {
        self.get_by_id_like(patterns)
            .try_fold(0usize, |total, _| async move { Ok::<_, StoreError>(total + 1) })
            .await
    }
}

/// The JSON instantiation every back-end in this crate implements
pub type JsonDataStore = dyn DataStore<Key, Document>;

/// Reject ids that cannot address a document
pub(crate) fn validate_id(id: &Key) -> Result<()> {
    id.validate().map_err(StoreError::Validation)
}
