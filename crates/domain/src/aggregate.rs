//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::{EventEnvelope, Version};
use serde::Serialize;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + Clone + Send + Sync {
    /// Returns the event kind name recorded in the log.
    fn event_type(&self) -> &'static str;
}

/// Trait for event-sourced aggregates.
///
/// An aggregate's state is never written directly: it is the fold of its
/// event history, and its version is the number of events in that history.
pub trait Aggregate: Clone + Send + Sync {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate type name recorded next to each event.
    fn aggregate_type() -> &'static str;

    fn aggregate_id(&self) -> AggregateId;

    /// Number of events applied so far.
    fn version(&self) -> Version;

    /// Wraps an event that has just been applied to `self` for the log.
    ///
    /// The envelope carries the aggregate's current version, so this must be
    /// called after the event is applied, not before.
    fn envelope_for(&self, event: &Self::Event) -> event_store::Result<EventEnvelope> {
        EventEnvelope::builder()
            .aggregate_id(self.aggregate_id())
            .aggregate_type(Self::aggregate_type())
            .event_type(event.event_type())
            .version(self.version())
            .payload(event)?
            .build()
    }
}
