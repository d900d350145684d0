//! Event bus carrying cache events between nodes
//!
//! The bus must deliver at least once and keep publish order per namespace.
//! Subscriptions are per namespace and yield events in arrival order. A
//! transport that has to drop events says so with [`Delivery::Lagged`] so the
//! subscriber can discard whatever state the missed events would have fixed.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::CacheEvent;
use crate::{Key, Result};

#[cfg(feature = "nats")]
pub mod nats;

/// One item of a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Event(CacheEvent),
    /// `skipped` events were dropped before reaching this subscriber
    Lagged(u64),
}

/// Trait for publish/subscribe transports
#[async_trait]
pub trait EventBus: Send + Sync + 'static {
    /// Publish an event on its namespace
    async fn publish(&self, event: CacheEvent) -> Result<()>;

    /// Subscribe to every event published on `namespace` from now on
    async fn subscribe(&self, namespace: &Key) -> Result<BoxStream<'static, Delivery>>;
}

/// Default number of events buffered per subscriber
const DEFAULT_CAPACITY: usize = 1024;

/// In-process bus, shared by every store of one process
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Subscribers falling more than `capacity` events behind skip ahead
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: CacheEvent) -> Result<()> {
        if self.sender.send(event).is_err() {
            debug!("No subscriber for cache event");
        }
        Ok(())
    }

    async fn subscribe(&self, namespace: &Key) -> Result<BoxStream<'static, Delivery>> {
        let receiver = self.sender.subscribe();
        let namespace = namespace.clone();
        let deliveries = stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(event) => Some((Delivery::Event(event), receiver)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Cache event subscriber lagged, events dropped");
                    Some((Delivery::Lagged(skipped), receiver))
                }
                Err(broadcast::error::RecvError::Closed) => None,
            }
        })
        // The namespace of dropped events is unknown, so gaps always pass.
        .filter(move |delivery| {
            let keep = match delivery {
                Delivery::Event(event) => event.namespace() == &namespace,
                Delivery::Lagged(_) => true,
            };
            futures::future::ready(keep)
        });
        Ok(deliveries.boxed())
    }
}
