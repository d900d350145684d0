//! Mutation events propagated between nodes

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::store::Document;
use crate::{Key, Pattern};

/// One committed mutation of a namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    Created {
        namespace: Key,
        id: Key,
        value: Document,
    },

    /// `old_id` differs from `id` when the document was moved
    Updated {
        namespace: Key,
        old_id: Key,
        id: Key,
        value: Document,
    },

    Deleted {
        namespace: Key,
        id: Key,
    },

    DeletedAll {
        namespace: Key,
        patterns: Vec<Pattern>,
    },
}

impl CacheEvent {
    pub fn namespace(&self) -> &Key {
        match self {
            CacheEvent::Created { namespace, .. }
            | CacheEvent::Updated { namespace, .. }
            | CacheEvent::Deleted { namespace, .. }
            | CacheEvent::DeletedAll { namespace, .. } => namespace,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CacheEvent::Created { .. } => "created",
            CacheEvent::Updated { .. } => "updated",
            CacheEvent::Deleted { .. } => "deleted",
            CacheEvent::DeletedAll { .. } => "deleted_all",
        }
    }

    /// Apply to a namespace cache. Applying the same event again leaves the
    /// cache unchanged.
    pub fn apply(&self, cache: &DashMap<Key, Document>) {
        match self {
            CacheEvent::Created { id, value, .. } => {
                cache.insert(id.clone(), value.clone());
            }
            CacheEvent::Updated {
                old_id, id, value, ..
            } => {
                if old_id != id {
                    cache.remove(old_id);
                }
                cache.insert(id.clone(), value.clone());
            }
            CacheEvent::Deleted { id, .. } => {
                cache.remove(id);
            }
            CacheEvent::DeletedAll { patterns, .. } => {
                cache.retain(|id, _| !id.matches_any(patterns));
            }
        }
    }
}
