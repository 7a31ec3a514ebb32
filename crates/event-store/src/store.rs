use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// Options for appending events to a stream.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Version the stream must be at for the append to succeed.
    /// `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Expects the stream to have no events yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }
}

/// The durable, append-only event log.
///
/// Implementations must be safe to share between aggregates running on
/// different tasks.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a contiguous batch of events to one aggregate's stream.
    ///
    /// The batch is recorded atomically. When `options.expected_version` is
    /// set and does not match the stream, nothing is recorded and
    /// [`EventStoreError::ConcurrencyConflict`] is returned.
    ///
    /// Returns the stream's version after the append.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// Returns the full history of an aggregate, oldest first.
    ///
    /// A brand-new aggregate has an empty history.
    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Current version of an aggregate's stream; [`Version::initial`] if it has no events.
    async fn current_version(&self, aggregate_id: AggregateId) -> Result<Version>;
}

/// Checks that a batch is non-empty, belongs to one aggregate and carries
/// consecutive versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(
                "all events must belong to the same aggregate".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "versions must be consecutive: expected {expected_version}, got {}",
                event.version
            )));
        }
    }

    if first.version == Version::initial() {
        return Err(EventStoreError::InvalidAppend(
            "event versions start at 1".to_string(),
        ));
    }

    Ok(())
}
