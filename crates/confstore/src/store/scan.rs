//! Scan-based back-end adapter
//!
//! Adapts any remote store that only offers exact-key get/set/delete plus a
//! cursor-based key scan (Redis being the reference) to the [`DataStore`]
//! contract. Pattern queries enumerate the namespace with repeated bounded
//! scans, filter the keys client-side, then fetch documents with batched
//! multi-gets, a bounded number of batches in flight.
//!
//! Results are a best-effort snapshot: keys deleted between the scan and the
//! fetch, and values that do not parse as JSON, are dropped from the stream.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryChunksError, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use confstore_common::SEPARATOR;

use super::{validate_id, DataStore, Document, DocumentStream};
use crate::{Key, PagingResult, Pattern, Result, StoreError};

/// Exact-key primitives plus cursor scan, as exposed by the remote store.
///
/// Implementations wrap an externally created connection or pool.
#[async_trait]
pub trait KeyValueClient: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Set only if `key` is absent; returns whether the value was written
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    /// Returns whether a key was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// One value per requested key, `None` for missing keys
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// One scan round. Returns the next cursor (0 once exhausted) and the
    /// keys of this round matching the glob `pattern`.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)>;
}

/// Batch sizes and concurrency bounds for pattern queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Keys requested per scan round trip
    pub scan_count: usize,
    /// Keys per multi-get
    pub fetch_batch: usize,
    /// Multi-gets or deletes in flight
    pub parallelism: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            scan_count: 500,
            fetch_batch: 50,
            parallelism: 50,
        }
    }
}

/// Document store over a [`KeyValueClient`]
pub struct ScanStore<C> {
    client: Arc<C>,
    namespace: Key,
    settings: ScanSettings,
}

impl<C: KeyValueClient> ScanStore<C> {
    pub fn new(client: Arc<C>, namespace: Key) -> Self {
        Self::with_settings(client, namespace, ScanSettings::default())
    }

    pub fn with_settings(client: Arc<C>, namespace: Key, settings: ScanSettings) -> Self {
        Self {
            client,
            namespace,
            settings,
        }
    }

    pub fn namespace(&self) -> &Key {
        &self.namespace
    }

    fn raw_key(&self, id: &Key) -> String {
        self.namespace.compose(id).to_string()
    }

    /// Glob handed to the remote scan. A single pattern narrows it to the
    /// pattern's literal prefix.
    fn scan_seed(&self, patterns: &[Pattern]) -> String {
        let (prefix, exact) = match patterns {
            [pattern] => {
                let literal = pattern.literal_prefix();
                let exact = literal.len() == pattern.len();
                (self.namespace.compose(&literal), exact)
            }
            _ => (self.namespace.clone(), false),
        };
        if prefix.is_empty() {
            "*".to_string()
        } else if exact {
            escape_glob(&prefix.to_string())
        } else {
            format!("{}{}*", escape_glob(&prefix.to_string()), SEPARATOR)
        }
    }

    /// Raw keys matching `seed`, one scan round trip at a time
    fn scan_keys(&self, seed: String) -> BoxStream<'static, Result<String>> {
        let client = self.client.clone();
        let count = self.settings.scan_count.max(1);
        stream::try_unfold(ScanState::Start, move |state| {
            scan_round(client.clone(), seed.clone(), count, state)
        })
        .map_ok(|keys| stream::iter(keys.into_iter().map(Ok::<String, StoreError>)))
        .try_flatten()
        .boxed()
    }

    /// Namespace-relative ids matching any pattern, each reported once
    fn matching_ids(&self, patterns: &[Pattern]) -> BoxStream<'static, Result<Key>> {
        if Pattern::none_matchable(patterns) {
            return stream::empty().boxed();
        }
        let namespace = self.namespace.clone();
        let patterns = patterns.to_vec();
        let mut seen = HashSet::new();
        self.scan_keys(self.scan_seed(&patterns))
            .try_filter_map(move |raw| {
                let id = Key::parse(&raw)
                    .strip_prefix(&namespace)
                    .filter(|id| id.matches_any(&patterns))
                    .filter(|_| seen.insert(raw));
                future::ready(Ok::<_, StoreError>(id))
            })
            .boxed()
    }

    /// Batched, bounded-parallel multi-get preserving id order
    fn fetch(&self, ids: BoxStream<'static, Result<Key>>) -> DocumentStream<Key, Document> {
        let client = self.client.clone();
        let namespace = self.namespace.clone();
        ids.try_chunks(self.settings.fetch_batch.max(1))
            .map_err(|TryChunksError(_, err)| err)
            .map_ok(move |batch| fetch_batch(client.clone(), namespace.clone(), batch))
            .try_buffered(self.settings.parallelism.max(1))
            .map_ok(|documents| stream::iter(documents.into_iter().map(Ok::<_, StoreError>)))
            .try_flatten()
            .boxed()
    }
}

#[async_trait]
impl<C: KeyValueClient> DataStore<Key, Document> for ScanStore<C> {
    async fn create(&self, id: Key, data: Document) -> Result<Document> {
        validate_id(&id)?;
        let raw = serde_json::to_string(&data)?;
        debug!(namespace = %self.namespace, id = %id, "Creating document");
        if !self.client.set_if_absent(&self.raw_key(&id), &raw).await? {
            return Err(StoreError::AlreadyExists(id));
        }
        Ok(data)
    }

    async fn update(&self, old_id: Key, id: Key, data: Document) -> Result<Document> {
        validate_id(&id)?;
        if old_id == id {
            let raw = serde_json::to_string(&data)?;
            debug!(namespace = %self.namespace, id = %id, "Updating document");
            self.client.set(&self.raw_key(&id), &raw).await?;
            return Ok(data);
        }
        debug!(namespace = %self.namespace, old_id = %old_id, id = %id, "Moving document");
        self.delete(old_id).await?;
        self.create(id, data).await
    }

    async fn delete(&self, id: Key) -> Result<Document> {
        let raw_key = self.raw_key(&id);
        let raw = match self.client.get(&raw_key).await? {
            Some(raw) => raw,
            None => return Err(StoreError::NotFound(id)),
        };
        // A concurrent delete may win between the read and ours; only one
        // caller reports the document.
        if !self.client.delete(&raw_key).await? {
            return Err(StoreError::NotFound(id));
        }
        debug!(namespace = %self.namespace, id = %id, "Deleted document");
        match serde_json::from_str(&raw) {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!(
                    namespace = %self.namespace,
                    id = %id,
                    error = %e,
                    "Deleted unparsable document"
                );
                Ok(Document::String(raw))
            }
        }
    }

    async fn delete_all(&self, patterns: &[Pattern]) -> Result<()> {
        let client = self.client.clone();
        let namespace = self.namespace.clone();
        let removed = self
            .matching_ids(patterns)
            .map_ok(move |id| {
                let client = client.clone();
                let raw_key = namespace.compose(&id).to_string();
                async move { client.delete(&raw_key).await }
            })
            .try_buffer_unordered(self.settings.parallelism.max(1))
            .try_fold(0usize, |total, removed| async move {
                Ok::<_, StoreError>(total + usize::from(removed))
            })
            .await?;
        debug!(namespace = %self.namespace, removed, "Deleted matching documents");
        Ok(())
    }

    async fn get_by_id(&self, id: &Key) -> Result<Option<Document>> {
        let raw = match self.client.get(&self.raw_key(id)).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match serde_json::from_str(&raw) {
            Ok(document) => Ok(Some(document)),
            Err(e) => {
                warn!(
                    namespace = %self.namespace,
                    id = %id,
                    error = %e,
                    "Ignoring unparsable document"
                );
                Ok(None)
            }
        }
    }

    fn get_by_id_like(&self, patterns: &[Pattern]) -> DocumentStream<Key, Document> {
        self.fetch(self.matching_ids(patterns))
    }

    async fn get_by_id_like_paged(
        &self,
        patterns: &[Pattern],
        page: usize,
        page_size: usize,
    ) -> Result<PagingResult<(Key, Document)>> {
        let skip = confstore_common::paging::offset(page, page_size)?;

        // One enumeration both counts every match and keeps the page window.
        let mut ids = self.matching_ids(patterns);
        let mut count = 0usize;
        let mut window = Vec::with_capacity(page_size.min(1024));
        while let Some(id) = ids.try_next().await? {
            if count >= skip && window.len() < page_size {
                window.push(id);
            }
            count += 1;
        }

        let results = self
            .fetch(stream::iter(window.into_iter().map(Ok)).boxed())
            .try_collect()
            .await?;
        Ok(PagingResult::new(results, page, page_size, count))
    }
}

/// Cursor position of one enumeration, owned by that enumeration alone
#[derive(Debug, Clone, Copy)]
enum ScanState {
    Start,
    Cursor(u64),
    Exhausted,
}

async fn scan_round<C: KeyValueClient>(
    client: Arc<C>,
    seed: String,
    count: usize,
    state: ScanState,
) -> Result<Option<(Vec<String>, ScanState)>> {
    let cursor = match state {
        ScanState::Start => 0,
        ScanState::Cursor(cursor) => cursor,
        ScanState::Exhausted => return Ok(None),
    };
    let (next, keys) = client.scan(cursor, &seed, count).await?;
    let next_state = if next == 0 {
        ScanState::Exhausted
    } else {
        ScanState::Cursor(next)
    };
    Ok(Some((keys, next_state)))
}

async fn fetch_batch<C: KeyValueClient>(
    client: Arc<C>,
    namespace: Key,
    ids: Vec<Key>,
) -> Result<Vec<(Key, Document)>> {
    let raw_keys: Vec<String> = ids.iter().map(|id| namespace.compose(id).to_string()).collect();
    let values = client.multi_get(&raw_keys).await?;

    let mut documents = Vec::with_capacity(ids.len());
    for (id, value) in ids.into_iter().zip(values) {
        match value {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(document) => documents.push((id, document)),
                Err(e) => {
                    warn!(
                        namespace = %namespace,
                        id = %id,
                        error = %e,
                        "Dropping unparsable document"
                    );
                }
            },
            None => debug!(namespace = %namespace, id = %id, "Document removed during scan"),
        }
    }
    Ok(documents)
}

/// Escape glob metacharacters so a literal prefix matches only itself
pub(crate) fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
