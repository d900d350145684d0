//! confstore: hierarchical JSON document store
//!
//! Runtime configuration and feature-flag documents are stored under
//! hierarchical [`Key`]s and queried with glob-style [`Pattern`]s through the
//! [`DataStore`] contract. Back-ends are interchangeable; a [`CachedStore`]
//! keeps a local cache coherent across nodes by replaying [`CacheEvent`]s
//! received from an [`EventBus`].

pub mod bus;
pub mod cache;
pub mod config;
pub mod factory;
pub mod store;
pub mod transfer;

pub use confstore_common::{
    AppErrors, ErrorMessage, Key, PagingResult, Pattern, PatternSegment, Result, StoreError,
};

// Store re-exports
pub use store::memory::{InMemoryStore, MemoryDatabase};
pub use store::scan::{KeyValueClient, ScanSettings, ScanStore};
pub use store::{DataStore, Document, DocumentStream, JsonDataStore};

#[cfg(feature = "redis")]
pub use store::redis::{RedisClient, RedisStoreConfig};

// Cache re-exports
pub use bus::{Delivery, EventBus, InMemoryEventBus};
pub use cache::{CacheEvent, CachedStore};

#[cfg(feature = "nats")]
pub use bus::nats::{NatsEventBus, NatsEventBusConfig};

pub use config::{BackendConfig, EventBusConfig, StoreConfig};
pub use factory::StoreFactory;
pub use transfer::{export_ndjson, import_ndjson, ExportLine, ImportResult, ImportStrategy};
