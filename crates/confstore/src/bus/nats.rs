//! NATS event bus implementation
//!
//! Core NATS publish/subscribe: each namespace maps to one subject,
//! `<prefix>.<namespace segments joined by '.'>`, carrying JSON events.
//! Segments are encoded into valid subject tokens: `.`, `*`, `>`, `%` and
//! whitespace become `%XX`, and an empty segment becomes `%`. The root
//! namespace uses the bare prefix.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Delivery, EventBus};
use crate::cache::CacheEvent;
use crate::{Key, Result, StoreError};

/// NATS event bus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsEventBusConfig {
    /// NATS server URL (e.g., "nats://localhost:4222")
    pub url: String,
    /// Subject prefix for cache events
    pub subject_prefix: String,
}

impl Default for NatsEventBusConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            subject_prefix: "confstore.events".to_string(),
        }
    }
}

/// NATS-backed [`EventBus`]
pub struct NatsEventBus {
    config: NatsEventBusConfig,
    client: async_nats::Client,
}

impl NatsEventBus {
    /// Connect to the NATS server
    pub async fn connect(config: NatsEventBusConfig) -> Result<Self> {
        let client = async_nats::connect(config.url.as_str())
            .await
            .map_err(|e| StoreError::EventBus(format!("Failed to connect to NATS: {}", e)))?;
        info!("Connected to NATS at {}", config.url);
        Ok(Self { config, client })
    }

    /// Subject carrying the events of `namespace`
    pub fn subject(&self, namespace: &Key) -> String {
        subject_for(&self.config.subject_prefix, namespace)
    }
}

fn subject_for(prefix: &str, namespace: &Key) -> String {
    if namespace.is_empty() {
        return prefix.to_string();
    }
    let tokens: Vec<String> = namespace.segments().iter().map(|s| subject_token(s)).collect();
    format!("{}.{}", prefix, tokens.join("."))
}

fn subject_token(segment: &str) -> String {
    if segment.is_empty() {
        return "%".to_string();
    }
    let mut token = String::with_capacity(segment.len());
    for c in segment.chars() {
        if matches!(c, '.' | '*' | '>' | '%') || c.is_whitespace() || c.is_control() {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                token.push_str(&format!("%{:02X}", byte));
            }
        } else {
            token.push(c);
        }
    }
    token
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn publish(&self, event: CacheEvent) -> Result<()> {
        let subject = self.subject(event.namespace());
        let payload = serde_json::to_vec(&event)
            .map_err(|e| StoreError::Serialization(format!("Failed to serialize event: {}", e)))?;

        debug!("Publishing {} event to {}", event.kind(), subject);

        self.client
            .publish(subject, payload.into())
            .await
            .map_err(|e| StoreError::EventBus(format!("Failed to publish event: {}", e)))
    }

    async fn subscribe(&self, namespace: &Key) -> Result<BoxStream<'static, Delivery>> {
        let subject = self.subject(namespace);
        let subscriber = self.client.subscribe(subject.clone()).await.map_err(|e| {
            StoreError::EventBus(format!("Failed to subscribe to {}: {}", subject, e))
        })?;

        info!("Subscribed to cache events on {}", subject);

        let events = subscriber.filter_map(|message| async move {
            match serde_json::from_slice::<CacheEvent>(&message.payload) {
                Ok(event) => Some(Delivery::Event(event)),
                Err(e) => {
                    warn!("Skipping undecodable cache event on {}: {}", message.subject, e);
                    None
                }
            }
        });
        Ok(events.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config = NatsEventBusConfig::default();
        assert_eq!(config.url, "nats://localhost:4222");
        assert_eq!(config.subject_prefix, "confstore.events");
    }

    #[test]
    fn test_subject_for_namespace() {
        assert_eq!(
            subject_for("confstore.events", &Key::parse("cfg:apikeys")),
            "confstore.events.cfg.apikeys"
        );
        assert_eq!(subject_for("p", &Key::empty()), "p");
        assert_ne!(subject_for("p", &Key::parse("_root")), subject_for("p", &Key::empty()));
    }

    #[test]
    fn test_subject_tokens_are_encoded() {
        assert_eq!(subject_for("p", &Key::parse("a.b")), "p.a%2Eb");
        assert_ne!(subject_for("p", &Key::parse("a.b")), subject_for("p", &Key::parse("a:b")));
        assert_eq!(subject_for("p", &Key::parse("x*:y>:z w")), "p.x%2A.y%3E.z%20w");
        assert_eq!(subject_for("p", &Key::parse("50%")), "p.50%25");
        assert_eq!(subject_for("p", &Key::parse("a::b")), "p.a.%.b");
    }

    // Integration test - requires NATS running
    #[tokio::test]
    #[ignore]
    async fn test_publish_subscribe() {
        let bus = NatsEventBus::connect(NatsEventBusConfig::default()).await.unwrap();
        let namespace = Key::parse("confstore-test");
        let mut events = bus.subscribe(&namespace).await.unwrap();

        let event = CacheEvent::Created {
            namespace: namespace.clone(),
            id: Key::parse("a"),
            value: json!(1),
        };
        bus.publish(event.clone()).await.unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), events.next())
            .await
            .unwrap();
        assert_eq!(received, Some(Delivery::Event(event)));
    }
}
