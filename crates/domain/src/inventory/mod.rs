//! Inventory aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod item;
mod registry;

pub use aggregate::{Inventory, InventorySnapshot};
pub use commands::{
    AddItem, CommandEnvelope, CommandKind, InventoryCommand, LISTENER_NAME, RemoveItem,
    UpdateItem,
};
pub use events::{EventKind, InventoryEvent, ItemAdded, ItemRemoved, ItemUpdated};
pub use item::InventoryItem;
pub use registry::{
    Applier, ApplierRegistry, DispatchKind, DispatchTable, Handler, HandlerRegistry,
    InventoryDispatch,
};

use common::{AggregateId, ItemId};
use event_store::{EventStoreError, Version};
use thiserror::Error;

/// Why a command produced no event.
///
/// Cloneable so it can travel inside notifications to every observer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// An identifier-keyed operation named an item that is not present.
    #[error("Item not found: {id}")]
    NotFound { id: ItemId },

    /// The command payload could not be decoded.
    #[error("Malformed command payload: {0}")]
    Deserialization(String),

    /// A command or event kind has no handler or applier. Fatal.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The command or the log expected a different aggregate version.
    #[error("Concurrency conflict: expected version {expected}, found {actual}")]
    ConcurrencyConflict { expected: Version, actual: Version },

    /// The command is addressed to another aggregate instance.
    #[error("Command addressed to aggregate {actual}, not {expected}")]
    WrongAggregate {
        expected: AggregateId,
        actual: AggregateId,
    },

    /// The event log refused the append for a reason other than a version conflict.
    #[error("Event log error: {0}")]
    Store(String),

    /// Every item id has been assigned; no further item can be added.
    #[error("No item ids left after {highest}")]
    IdsExhausted { highest: ItemId },

    /// The aggregate stopped before this command could be handled.
    #[error("Aggregate stopped before the command was handled")]
    Stopped,
}

impl InventoryError {
    /// Fatal errors stop the aggregate from accepting further commands.
    pub fn is_fatal(&self) -> bool {
        matches!(self, InventoryError::Configuration(_))
    }
}

impl From<EventStoreError> for InventoryError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict {
                expected, actual, ..
            } => InventoryError::ConcurrencyConflict { expected, actual },
            other => InventoryError::Store(other.to_string()),
        }
    }
}
