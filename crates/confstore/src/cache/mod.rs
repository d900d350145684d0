//! Cache-coherence layer
//!
//! [`CachedStore`] wraps an authoritative back-end and keeps a local cache of
//! its namespace. Writes go to the back-end first; once committed, a
//! [`CacheEvent`] is published on the [`EventBus`]. The cache is mutated only
//! by the consumer task replaying events from the bus, including the events
//! this node published itself, so every node applies mutations through the
//! same path.
//!
//! Reads by id are served from the cache, falling back to the back-end and
//! filling the cache on a miss. Pattern queries always go to the back-end:
//! the cache is never known to be complete. When the bus reports dropped
//! events the cache is emptied; once the subscription ends it is bypassed.

mod event;
mod state;

pub use event::CacheEvent;

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use self::state::CacheState;
use crate::bus::{Delivery, EventBus};
use crate::store::{DataStore, Document, DocumentStream, JsonDataStore};
use crate::{Key, PagingResult, Pattern, Result};

/// Document store with a node-local cache kept coherent through an event bus
pub struct CachedStore {
    namespace: Key,
    underlying: Arc<JsonDataStore>,
    bus: Arc<dyn EventBus>,
    state: Arc<CacheState>,
    cancel_token: CancellationToken,
}

impl CachedStore {
    /// Subscribe to the namespace's events and start the consumer task.
    ///
    /// The subscription is live when this returns, so events published
    /// afterwards, including this node's own, reach the cache.
    pub async fn start(
        namespace: Key,
        underlying: Arc<JsonDataStore>,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self> {
        let mut events = bus.subscribe(&namespace).await?;
        let state = Arc::new(CacheState::new());
        let cancel_token = CancellationToken::new();

        let consumer_state = state.clone();
        let consumer_token = cancel_token.clone();
        let consumer_namespace = namespace.clone();
        tokio::spawn(async move {
            info!(namespace = %consumer_namespace, "Starting cache event consumer");

            loop {
                tokio::select! {
                    _ = consumer_token.cancelled() => {
                        info!(namespace = %consumer_namespace, "Cache event consumer cancelled");
                        break;
                    }
                    next = events.next() => {
                        match next {
                            Some(Delivery::Event(event)) => {
                                debug!(
                                    namespace = %consumer_namespace,
                                    kind = event.kind(),
                                    "Applying cache event"
                                );
                                consumer_state.apply(&event);
                            }
                            Some(Delivery::Lagged(skipped)) => {
                                warn!(
                                    namespace = %consumer_namespace,
                                    skipped,
                                    "Cache events lost, clearing cache"
                                );
                                consumer_state.reset();
                            }
                            None => {
                                warn!(namespace = %consumer_namespace, "Cache event stream closed");
                                break;
                            }
                        }
                    }
                }
            }

            consumer_state.detach();
            info!(namespace = %consumer_namespace, "Cache event consumer ended");
        });

        Ok(Self {
            namespace,
            underlying,
            bus,
            state,
            cancel_token,
        })
    }

    pub fn namespace(&self) -> &Key {
        &self.namespace
    }

    /// Cached document for `id`, without falling back to the back-end
    pub fn cached(&self, id: &Key) -> Option<Document> {
        self.state.get(id)
    }

    pub fn cache_len(&self) -> usize {
        self.state.len()
    }

    /// False once the consumer has stopped; reads then go to the back-end
    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    /// Stop consuming events. The cache is emptied and no longer used.
    pub fn shutdown(&self) {
        info!(namespace = %self.namespace, "Shutting down cache event consumer");
        self.cancel_token.cancel();
    }

    /// Publish after a committed write. A failed publish is logged only: the
    /// back-end already holds the truth and the cache heals on read-through.
    async fn publish(&self, event: CacheEvent) {
        let kind = event.kind();
        if let Err(e) = self.bus.publish(event).await {
            error!(namespace = %self.namespace, kind, error = %e, "Failed to publish cache event");
        }
    }
}

impl Drop for CachedStore {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[async_trait]
impl DataStore<Key, Document> for CachedStore {
    async fn create(&self, id: Key, data: Document) -> Result<Document> {
        let created = self.underlying.create(id.clone(), data).await?;
        self.publish(CacheEvent::Created {
            namespace: self.namespace.clone(),
            id,
            value: created.clone(),
        })
        .await;
        Ok(created)
    }

    async fn update(&self, old_id: Key, id: Key, data: Document) -> Result<Document> {
        let updated = self
            .underlying
            .update(old_id.clone(), id.clone(), data)
            .await?;
        self.publish(CacheEvent::Updated {
            namespace: self.namespace.clone(),
            old_id,
            id,
            value: updated.clone(),
        })
        .await;
        Ok(updated)
    }

    async fn delete(&self, id: Key) -> Result<Document> {
        let deleted = self.underlying.delete(id.clone()).await?;
        self.publish(CacheEvent::Deleted {
            namespace: self.namespace.clone(),
            id,
        })
        .await;
        Ok(deleted)
    }

    async fn delete_all(&self, patterns: &[Pattern]) -> Result<()> {
        self.underlying.delete_all(patterns).await?;
        self.publish(CacheEvent::DeletedAll {
            namespace: self.namespace.clone(),
            patterns: patterns.to_vec(),
        })
        .await;
        Ok(())
    }

    async fn get_by_id(&self, id: &Key) -> Result<Option<Document>> {
        if let Some(hit) = self.cached(id) {
            return Ok(Some(hit));
        }
        let seen = self.state.generation();
        let fetched = self.underlying.get_by_id(id).await?;
        if let Some(document) = &fetched {
            if !self.state.fill(id.clone(), document.clone(), seen) {
                debug!(
                    namespace = %self.namespace,
                    id = %id,
                    "Events applied during read, not caching"
                );
            }
        }
        Ok(fetched)
    }

    fn get_by_id_like(&self, patterns: &[Pattern]) -> DocumentStream<Key, Document> {
        self.underlying.get_by_id_like(patterns)
    }

    async fn get_by_id_like_paged(
        &self,
        patterns: &[Pattern],
        page: usize,
        page_size: usize,
    ) -> Result<PagingResult<(Key, Document)>> {
        self.underlying
            .get_by_id_like_paged(patterns, page, page_size)
            .await
    }

    async fn count(&self, patterns: &[Pattern]) -> Result<usize> {
        self.underlying.count(patterns).await
    }
}
