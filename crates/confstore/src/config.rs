//! Store configuration for runtime back-end selection.
//!
//! # Example
//! ```rust,ignore
//! use confstore::{StoreConfig, StoreFactory};
//!
//! // From environment
//! let config = StoreConfig::from_env()?;
//!
//! // Or from a YAML document
//! let config = StoreConfig::from_yaml_str("backend:\n  type: redis\n")?;
//!
//! let factory = StoreFactory::connect(config).await?;
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::store::scan::ScanSettings;
use crate::{Result, StoreError};

#[cfg(feature = "redis")]
use crate::store::redis::RedisStoreConfig;

#[cfg(feature = "nats")]
use crate::bus::nats::NatsEventBusConfig;

/// Back-end holding the documents
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Process-local ordered map
    #[default]
    InMemory,

    /// Redis through the scan-based adapter
    #[cfg(feature = "redis")]
    Redis(RedisStoreConfig),
}

impl BackendConfig {
    pub fn backend_type(&self) -> &'static str {
        match self {
            BackendConfig::InMemory => "in_memory",
            #[cfg(feature = "redis")]
            BackendConfig::Redis(_) => "redis",
        }
    }
}

/// Bus carrying cache events between nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBusConfig {
    /// In-process broadcast, coherent only within one process
    InMemory {
        #[serde(default = "default_bus_capacity")]
        capacity: usize,
    },

    #[cfg(feature = "nats")]
    Nats(NatsEventBusConfig),
}

fn default_bus_capacity() -> usize {
    1024
}

impl EventBusConfig {
    pub fn bus_type(&self) -> &'static str {
        match self {
            EventBusConfig::InMemory { .. } => "in_memory",
            #[cfg(feature = "nats")]
            EventBusConfig::Nats(_) => "nats",
        }
    }
}

/// Everything needed to build stores
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    /// No cache layer when absent
    pub cache: Option<EventBusConfig>,
    pub scan: ScanSettings,
}

impl StoreConfig {
    /// Create configuration from environment variables.
    ///
    /// `CONFSTORE_BACKEND` selects the back-end (default `in_memory`):
    /// - `in_memory`
    /// - `redis` -> Uses REDIS_URL, REDIS_POOL_SIZE
    ///
    /// `CONFSTORE_CACHE` selects the cache bus (default `none`):
    /// - `none`
    /// - `in_memory`
    /// - `nats` -> Uses NATS_URL, NATS_SUBJECT_PREFIX
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_type = lookup("CONFSTORE_BACKEND").unwrap_or_else(|| "in_memory".to_string());
        let backend = match backend_type.to_lowercase().as_str() {
            "in_memory" | "memory" => BackendConfig::InMemory,

            #[cfg(feature = "redis")]
            "redis" => {
                let defaults = RedisStoreConfig::default();
                let pool_size = match lookup("REDIS_POOL_SIZE") {
                    Some(raw) => raw.parse().map_err(|e| {
                        StoreError::Configuration(format!(
                            "Invalid REDIS_POOL_SIZE '{}': {}",
                            raw, e
                        ))
                    })?,
                    None => defaults.pool_size,
                };
                BackendConfig::Redis(RedisStoreConfig {
                    url: lookup("REDIS_URL").unwrap_or(defaults.url),
                    pool_size,
                })
            }

            other => {
                return Err(StoreError::Configuration(format!(
                    "Unknown backend type: '{}'. Available types: {}",
                    other,
                    Self::available_backends().join(", ")
                )))
            }
        };

        let cache_type = lookup("CONFSTORE_CACHE").unwrap_or_else(|| "none".to_string());
        let cache = match cache_type.to_lowercase().as_str() {
            "none" | "" => None,
            "in_memory" | "memory" => Some(EventBusConfig::InMemory {
                capacity: default_bus_capacity(),
            }),

            #[cfg(feature = "nats")]
            "nats" => {
                let defaults = NatsEventBusConfig::default();
                Some(EventBusConfig::Nats(NatsEventBusConfig {
                    url: lookup("NATS_URL").unwrap_or(defaults.url),
                    subject_prefix: lookup("NATS_SUBJECT_PREFIX")
                        .unwrap_or(defaults.subject_prefix),
                }))
            }

            other => {
                return Err(StoreError::Configuration(format!(
                    "Unknown cache bus type: '{}'. Available types: {}",
                    other,
                    Self::available_buses().join(", ")
                )))
            }
        };

        Ok(Self {
            backend,
            cache,
            scan: ScanSettings::default(),
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| StoreError::Configuration(format!("Failed to parse config: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Returns list of available back-end types based on compiled features.
    #[allow(clippy::vec_init_then_push)]
    pub fn available_backends() -> Vec<&'static str> {
        let mut types = vec!["in_memory"];

        #[cfg(feature = "redis")]
        types.push("redis");

        types
    }

    /// Returns list of available cache bus types based on compiled features.
    #[allow(clippy::vec_init_then_push)]
    pub fn available_buses() -> Vec<&'static str> {
        let mut types = vec!["none", "in_memory"];

        #[cfg(feature = "nats")]
        types.push("nats");

        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.backend.backend_type(), "in_memory");
        assert!(config.cache.is_none());
    }

    #[test]
    fn test_unknown_backend_lists_available() {
        let err = StoreConfig::from_lookup(lookup(&[("CONFSTORE_BACKEND", "mongo")])).unwrap_err();
        match err {
            StoreError::Configuration(msg) => {
                assert!(msg.contains("mongo"));
                assert!(msg.contains("in_memory"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_cache_bus() {
        let err = StoreConfig::from_lookup(lookup(&[("CONFSTORE_CACHE", "kafka")])).unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn test_in_memory_cache_from_env() {
        let config = StoreConfig::from_lookup(lookup(&[("CONFSTORE_CACHE", "in_memory")])).unwrap();
        assert_eq!(config.cache, Some(EventBusConfig::InMemory { capacity: 1024 }));
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_from_env() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("CONFSTORE_BACKEND", "Redis"),
            ("REDIS_URL", "redis://cache:6379"),
            ("REDIS_POOL_SIZE", "4"),
        ]))
        .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Redis(RedisStoreConfig {
                url: "redis://cache:6379".to_string(),
                pool_size: 4,
            })
        );

        let err = StoreConfig::from_lookup(lookup(&[
            ("CONFSTORE_BACKEND", "redis"),
            ("REDIS_POOL_SIZE", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[cfg(feature = "nats")]
    #[test]
    fn test_nats_from_env() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("CONFSTORE_CACHE", "nats"),
            ("NATS_URL", "nats://bus:4222"),
        ]))
        .unwrap();
        assert_eq!(
            config.cache,
            Some(EventBusConfig::Nats(NatsEventBusConfig {
                url: "nats://bus:4222".to_string(),
                subject_prefix: "confstore.events".to_string(),
            }))
        );
    }

    #[test]
    fn test_yaml_partial() {
        let config = StoreConfig::from_yaml_str(
            "cache:\n  type: in_memory\nscan:\n  scan_count: 1000\n",
        )
        .unwrap();
        assert_eq!(config.backend, BackendConfig::InMemory);
        assert_eq!(config.cache, Some(EventBusConfig::InMemory { capacity: 1024 }));
        assert_eq!(config.scan.scan_count, 1000);
        assert_eq!(config.scan.fetch_batch, 50);
    }

    #[cfg(all(feature = "redis", feature = "nats"))]
    #[test]
    fn test_yaml_full() {
        let yaml = r#"
backend:
  type: redis
  url: redis://cache:6379
cache:
  type: nats
  subject_prefix: cfg.events
"#;
        let config = StoreConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.backend.backend_type(), "redis");
        match config.cache {
            Some(EventBusConfig::Nats(nats)) => {
                assert_eq!(nats.url, "nats://localhost:4222");
                assert_eq!(nats.subject_prefix, "cfg.events");
            }
            other => panic!("unexpected cache config: {:?}", other),
        }
    }

    #[test]
    fn test_yaml_rejects_unknown_backend() {
        let err = StoreConfig::from_yaml_str("backend:\n  type: etcd\n").unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn test_available_types() {
        assert!(StoreConfig::available_backends().contains(&"in_memory"));
        assert!(StoreConfig::available_buses().contains(&"none"));
    }
}
