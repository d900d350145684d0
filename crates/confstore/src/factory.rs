//! Store construction from a [`StoreConfig`]

use std::sync::Arc;

use tracing::info;

use crate::bus::{EventBus, InMemoryEventBus};
use crate::cache::CachedStore;
use crate::config::{BackendConfig, EventBusConfig, StoreConfig};
use crate::store::memory::{InMemoryStore, MemoryDatabase};
use crate::store::JsonDataStore;
use crate::{Key, Result};

#[cfg(feature = "nats")]
use crate::bus::nats::NatsEventBus;

#[cfg(feature = "redis")]
use crate::store::{redis::RedisClient, scan::ScanStore};

/// Shared resources of the configured back-end
enum Backend {
    InMemory(MemoryDatabase),
    #[cfg(feature = "redis")]
    Redis(Arc<RedisClient>),
}

/// Holds the connections every store of a process shares and hands out
/// namespace-scoped stores
pub struct StoreFactory {
    config: StoreConfig,
    backend: Backend,
    bus: Option<Arc<dyn EventBus>>,
}

impl StoreFactory {
    /// Establish the back-end and, when configured, the cache bus
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let backend = match &config.backend {
            BackendConfig::InMemory => Backend::InMemory(MemoryDatabase::new()),
            #[cfg(feature = "redis")]
            BackendConfig::Redis(redis) => {
                let pool = redis.connect().await?;
                Backend::Redis(Arc::new(RedisClient::new(pool)))
            }
        };

        let bus: Option<Arc<dyn EventBus>> = match &config.cache {
            None => None,
            Some(EventBusConfig::InMemory { capacity }) => {
                Some(Arc::new(InMemoryEventBus::with_capacity(*capacity)))
            }
            #[cfg(feature = "nats")]
            Some(EventBusConfig::Nats(nats)) => {
                Some(Arc::new(NatsEventBus::connect(nats.clone()).await?))
            }
        };

        info!(
            backend = config.backend.backend_type(),
            cache = config.cache.as_ref().map(|c| c.bus_type()).unwrap_or("none"),
            "Store factory ready"
        );

        Ok(Self {
            config,
            backend,
            bus,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store scoped to `namespace`, cached when a cache bus is configured
    pub async fn build(&self, namespace: Key) -> Result<Arc<JsonDataStore>> {
        let store: Arc<JsonDataStore> = match &self.backend {
            Backend::InMemory(db) => {
                Arc::new(InMemoryStore::with_database(db.clone(), namespace.clone()))
            }
            #[cfg(feature = "redis")]
            Backend::Redis(client) => Arc::new(ScanStore::with_settings(
                client.clone(),
                namespace.clone(),
                self.config.scan,
            )),
        };

        match &self.bus {
            Some(bus) => {
                let cached = CachedStore::start(namespace, store, bus.clone()).await?;
                Ok(Arc::new(cached))
            }
            None => Ok(store),
        }
    }
}
