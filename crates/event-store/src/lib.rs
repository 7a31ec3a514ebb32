//! Append-only event log.
//!
//! The log is the durable identity of an aggregate: its in-memory state can
//! always be thrown away and recomputed by replaying [`EventStore::load`].

pub mod error;
pub mod event;
pub mod memory;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use store::{AppendOptions, EventStore};
