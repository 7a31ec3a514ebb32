//! Command transport.
//!
//! Commands travel as serialized envelopes addressed to a
//! [`ListenerDescriptor`] (a listener name plus a routing key). Consumers bind
//! an async [`DeliveryHandler`] to each descriptor they serve; producers call
//! [`CommandBusExt::send`] with anything that implements [`RoutedCommand`].
//!
//! The contract is at-least-once: a handler may see the same delivery more
//! than once and, on transports other than [`InMemoryCommandBus`], deliveries
//! for different routing keys may run concurrently.

pub mod bus;
pub mod error;
pub mod listener;
pub mod memory;

pub use bus::{CommandBus, CommandBusExt};
pub use error::{BusError, Result};
pub use listener::{Delivery, DeliveryHandler, HandlerFuture, ListenerDescriptor, RoutedCommand};
pub use memory::InMemoryCommandBus;
