//! Event-sourced inventory aggregate.
//!
//! - [`inventory`]: the command and event vocabulary, the projection state and
//!   the dispatch tables that turn commands into events and events into state
//! - [`runtime`]: the mailbox that serializes command handling for one
//!   aggregate instance, persists events and notifies observers

pub mod aggregate;
pub mod error;
pub mod inventory;
pub mod runtime;

pub use aggregate::{Aggregate, DomainEvent};
pub use error::DomainError;
pub use inventory::{
    AddItem, CommandEnvelope, CommandKind, EventKind, Inventory, InventoryCommand,
    InventoryDispatch, InventoryError, InventoryEvent, InventoryItem, InventorySnapshot,
    ItemAdded, ItemRemoved, ItemUpdated, RemoveItem, UpdateItem,
};
pub use runtime::{AggregateConfig, InventoryAggregate, Notification, Outcome, load_inventory};
