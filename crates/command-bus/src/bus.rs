use async_trait::async_trait;

use crate::{DeliveryHandler, ListenerDescriptor, Result, RoutedCommand};

/// Publish/subscribe transport for commands.
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// Binds `handler` to `listener`. A descriptor has at most one handler.
    async fn register_handler(
        &self,
        listener: ListenerDescriptor,
        handler: DeliveryHandler,
    ) -> Result<()>;

    /// Removes the handler bound to `listener`, if any.
    async fn unregister_handler(&self, listener: &ListenerDescriptor);

    /// Publishes a raw envelope to `listener`.
    async fn publish(&self, listener: ListenerDescriptor, body: Vec<u8>) -> Result<()>;
}

#[async_trait]
pub trait CommandBusExt: CommandBus {
    /// Serializes `command` to JSON and publishes it to its listener.
    async fn send<C: RoutedCommand>(&self, command: &C) -> Result<()> {
        let body = serde_json::to_vec(command)?;
        self.publish(command.listener(), body).await
    }
}

impl<T: CommandBus + ?Sized> CommandBusExt for T {}
