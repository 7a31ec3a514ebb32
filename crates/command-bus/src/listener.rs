use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

/// Address of a command handler: the consuming component's name plus the
/// routing key of one command kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerDescriptor {
    pub name: String,
    pub routing_key: String,
}

impl ListenerDescriptor {
    pub fn new(name: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routing_key: routing_key.into(),
        }
    }
}

impl std::fmt::Display for ListenerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.routing_key)
    }
}

/// One message handed to a handler.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub listener: ListenerDescriptor,

    /// Monotonic per-bus sequence number, useful for correlating logs.
    pub delivery_tag: u64,

    /// UTF-8 JSON envelope as produced by [`crate::CommandBusExt::send`].
    pub body: Vec<u8>,
}

impl Delivery {
    pub fn body_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Async callback bound to a [`ListenerDescriptor`].
pub type DeliveryHandler = Arc<dyn Fn(Delivery) -> HandlerFuture + Send + Sync>;

/// A command that knows where it must be delivered.
pub trait RoutedCommand: Serialize + Send + Sync {
    fn listener(&self) -> ListenerDescriptor;
}
