use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{BusError, CommandBus, Delivery, DeliveryHandler, ListenerDescriptor, Result};

/// In-process command bus.
///
/// `publish` awaits the bound handler before returning, so one producer's
/// commands reach their handlers in the order they were sent. Handlers
/// should therefore only hand the delivery off (e.g. to a mailbox) rather
/// than do the work inline.
#[derive(Clone, Default)]
pub struct InMemoryCommandBus {
    routes: Arc<RwLock<HashMap<ListenerDescriptor, DeliveryHandler>>>,
    next_tag: Arc<AtomicU64>,
}

impl InMemoryCommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn route_count(&self) -> usize {
        self.routes.read().await.len()
    }

    pub async fn is_registered(&self, listener: &ListenerDescriptor) -> bool {
        self.routes.read().await.contains_key(listener)
    }
}

#[async_trait]
impl CommandBus for InMemoryCommandBus {
    async fn register_handler(
        &self,
        listener: ListenerDescriptor,
        handler: DeliveryHandler,
    ) -> Result<()> {
        let mut routes = self.routes.write().await;
        if routes.contains_key(&listener) {
            return Err(BusError::DuplicateListener(listener));
        }
        tracing::debug!(%listener, "handler registered");
        routes.insert(listener, handler);
        Ok(())
    }

    async fn unregister_handler(&self, listener: &ListenerDescriptor) {
        if self.routes.write().await.remove(listener).is_some() {
            tracing::debug!(%listener, "handler unregistered");
        }
    }

    async fn publish(&self, listener: ListenerDescriptor, body: Vec<u8>) -> Result<()> {
        // Clone the handler out so the routing table is not locked while it runs.
        let handler = self
            .routes
            .read()
            .await
            .get(&listener)
            .cloned()
            .ok_or_else(|| BusError::NoRoute(listener.clone()))?;

        let delivery = Delivery {
            delivery_tag: self.next_tag.fetch_add(1, Ordering::Relaxed),
            listener,
            body,
        };

        tracing::trace!(
            listener = %delivery.listener,
            delivery_tag = delivery.delivery_tag,
            "delivering command"
        );
        metrics::counter!("command_bus_deliveries_total").increment(1);

        handler(delivery).await;
        Ok(())
    }
}
