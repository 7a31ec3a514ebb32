//! Inventory domain events.

use std::fmt;
use std::str::FromStr;

use common::{AggregateId, ItemId};
use event_store::EventEnvelope;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::InventoryError;
use super::registry::DispatchKind;

/// An item was added under a freshly assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemAdded {
    pub id: ItemId,
    pub aggregate_id: AggregateId,
    pub item: String,
    pub quantity: i32,
}

/// An item was removed. May name an id that was never present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemRemoved {
    pub id: ItemId,
    pub aggregate_id: AggregateId,
}

/// An existing item's name and quantity were overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemUpdated {
    pub id: ItemId,
    pub aggregate_id: AggregateId,
    pub item: String,
    pub quantity: i32,
}

/// Events recorded by the inventory aggregate.
///
/// The payload stored in the log is the bare variant data
/// (`{"Id", "AggregateId", "Item"?, "Quantity"?}`); the kind travels in the
/// envelope's `event_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InventoryEvent {
    ItemAdded(ItemAdded),
    ItemRemoved(ItemRemoved),
    ItemUpdated(ItemUpdated),
}

impl InventoryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InventoryEvent::ItemAdded(_) => EventKind::ItemAdded,
            InventoryEvent::ItemRemoved(_) => EventKind::ItemRemoved,
            InventoryEvent::ItemUpdated(_) => EventKind::ItemUpdated,
        }
    }

    /// Id of the item this event is about.
    pub fn item_id(&self) -> ItemId {
        match self {
            InventoryEvent::ItemAdded(data) => data.id,
            InventoryEvent::ItemRemoved(data) => data.id,
            InventoryEvent::ItemUpdated(data) => data.id,
        }
    }

    pub fn item_added(
        aggregate_id: AggregateId,
        id: ItemId,
        item: impl Into<String>,
        quantity: i32,
    ) -> Self {
        InventoryEvent::ItemAdded(ItemAdded {
            id,
            aggregate_id,
            item: item.into(),
            quantity,
        })
    }

    pub fn item_removed(aggregate_id: AggregateId, id: ItemId) -> Self {
        InventoryEvent::ItemRemoved(ItemRemoved { id, aggregate_id })
    }

    pub fn item_updated(
        aggregate_id: AggregateId,
        id: ItemId,
        item: impl Into<String>,
        quantity: i32,
    ) -> Self {
        InventoryEvent::ItemUpdated(ItemUpdated {
            id,
            aggregate_id,
            item: item.into(),
            quantity,
        })
    }

    /// Reads an event back from the log.
    ///
    /// An `event_type` this aggregate does not know is a configuration
    /// error; a payload that does not fit its kind is a deserialization error.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Self, InventoryError> {
        let kind: EventKind = envelope.event_type.parse()?;
        let payload = envelope.payload.clone();
        let event = match kind {
            EventKind::ItemAdded => serde_json::from_value(payload).map(InventoryEvent::ItemAdded),
            EventKind::ItemRemoved => {
                serde_json::from_value(payload).map(InventoryEvent::ItemRemoved)
            }
            EventKind::ItemUpdated => {
                serde_json::from_value(payload).map(InventoryEvent::ItemUpdated)
            }
        };
        event.map_err(|e| {
            InventoryError::Deserialization(format!(
                "{kind} event at version {}: {e}",
                envelope.version
            ))
        })
    }
}

impl DomainEvent for InventoryEvent {
    fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }
}

/// Discriminant of [`InventoryEvent`], used as the applier table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ItemAdded,
    ItemRemoved,
    ItemUpdated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ItemAdded => "ItemAdded",
            EventKind::ItemRemoved => "ItemRemoved",
            EventKind::ItemUpdated => "ItemUpdated",
        }
    }
}

impl DispatchKind for EventKind {
    const ALL: &'static [Self] = &[
        EventKind::ItemAdded,
        EventKind::ItemRemoved,
        EventKind::ItemUpdated,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| InventoryError::Configuration(format!("unknown event kind {s:?}")))
    }
}
