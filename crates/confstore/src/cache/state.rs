//! Node-local cache content and its event generation

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;

use super::CacheEvent;
use crate::store::Document;
use crate::Key;

/// Cached documents of one namespace.
///
/// Every applied event bumps `generation` under its write lock. A read-through
/// fill remembers the generation seen before its back-end read and only lands
/// if no event was applied in between, so an event can never be undone by a
/// read that started before it.
pub(super) struct CacheState {
    entries: DashMap<Key, Document>,
    generation: RwLock<u64>,
    /// False once events stop arriving; the cache is then bypassed
    live: AtomicBool,
}

impl CacheState {
    pub(super) fn new() -> Self {
        Self {
            entries: DashMap::new(),
            generation: RwLock::new(0),
            live: AtomicBool::new(true),
        }
    }

    pub(super) fn get(&self, id: &Key) -> Option<Document> {
        if !self.is_live() {
            return None;
        }
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub(super) fn generation(&self) -> u64 {
        *self.generation.read()
    }

    pub(super) fn apply(&self, event: &CacheEvent) {
        let mut generation = self.generation.write();
        event.apply(&self.entries);
        *generation += 1;
    }

    /// Forget everything, e.g. after events were lost
    pub(super) fn reset(&self) {
        let mut generation = self.generation.write();
        self.entries.clear();
        *generation += 1;
    }

    /// Forget everything and stop serving from the cache
    pub(super) fn detach(&self) {
        let mut generation = self.generation.write();
        self.live.store(false, Ordering::SeqCst);
        self.entries.clear();
        *generation += 1;
    }

    /// Store a document read from the back-end unless an event was applied
    /// since `seen`. Returns whether the document was cached.
    pub(super) fn fill(&self, id: Key, document: Document, seen: u64) -> bool {
        let generation = self.generation.read();
        if *generation != seen || !self.is_live() {
            return false;
        }
        self.entries.entry(id).or_insert(document);
        true
    }
}
