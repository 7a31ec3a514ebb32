//! Domain error types.

use command_bus::BusError;
use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::inventory::InventoryError;

/// Errors surfaced to callers of the aggregate runtime.
///
/// Command outcomes are not reported here: a rejected command shows up as a
/// [`crate::Outcome::Rejected`] notification. These are failures to start,
/// reach or stop the aggregate.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Command bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The aggregate no longer accepts commands.
    #[error("Aggregate {0} is stopped")]
    AggregateStopped(AggregateId),

    #[error("Aggregate worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
