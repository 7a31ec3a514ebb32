//! Inventory projection state.

use std::collections::BTreeMap;

use common::{AggregateId, ItemId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{CommandKind, EventKind, InventoryCommand, InventoryError, InventoryEvent, InventoryItem};

/// The materialized state of one inventory aggregate.
///
/// Only [`super::InventoryDispatch`] changes it, one event at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    aggregate_id: AggregateId,

    /// Items currently present, ordered by id.
    items: BTreeMap<ItemId, InventoryItem>,

    /// Largest id ever handed out, including ids of removed items.
    highest_assigned_id: ItemId,

    /// Number of events applied.
    version: Version,
}

/// Point-in-time copy of an inventory, as handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventorySnapshot {
    pub aggregate_id: AggregateId,
    pub version: Version,
    pub highest_assigned_id: ItemId,
    pub items: Vec<InventoryItem>,
}

impl Aggregate for Inventory {
    type Event = InventoryEvent;

    fn aggregate_type() -> &'static str {
        "InventoryAggregate"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    fn version(&self) -> Version {
        self.version
    }
}

// Query methods
impl Inventory {
    /// An empty inventory, as for a brand-new aggregate.
    pub fn new(aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id,
            items: BTreeMap::new(),
            highest_assigned_id: ItemId::default(),
            version: Version::initial(),
        }
    }

    /// Items in id order.
    pub fn items(&self) -> impl Iterator<Item = &InventoryItem> {
        self.items.values()
    }

    pub fn get_item(&self, id: ItemId) -> Option<&InventoryItem> {
        self.items.get(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn highest_assigned_id(&self) -> ItemId {
        self.highest_assigned_id
    }

    /// The id the next AddItem will receive, if any is left.
    pub fn next_item_id(&self) -> Option<ItemId> {
        self.highest_assigned_id.next()
    }

    pub fn snapshot(&self) -> InventorySnapshot {
        InventorySnapshot {
            aggregate_id: self.aggregate_id,
            version: self.version,
            highest_assigned_id: self.highest_assigned_id,
            items: self.items.values().cloned().collect(),
        }
    }
}

// Command handlers (return events)
impl Inventory {
    /// Assigns the next id and produces `ItemAdded`.
    pub fn handle_add_item(
        &self,
        command: &InventoryCommand,
    ) -> Result<InventoryEvent, InventoryError> {
        let InventoryCommand::AddItem(cmd) = command else {
            return Err(handler_mismatch(CommandKind::AddItem, command));
        };
        let id = self.next_item_id().ok_or(InventoryError::IdsExhausted {
            highest: self.highest_assigned_id,
        })?;
        Ok(InventoryEvent::item_added(
            self.aggregate_id,
            id,
            cmd.item.clone(),
            cmd.quantity,
        ))
    }

    /// Produces `ItemRemoved`, whether or not the item is present.
    pub fn handle_remove_item(
        &self,
        command: &InventoryCommand,
    ) -> Result<InventoryEvent, InventoryError> {
        let InventoryCommand::RemoveItem(cmd) = command else {
            return Err(handler_mismatch(CommandKind::RemoveItem, command));
        };
        Ok(InventoryEvent::item_removed(self.aggregate_id, cmd.id))
    }

    /// Produces `ItemUpdated`. Presence is checked when the event is applied.
    pub fn handle_update_item(
        &self,
        command: &InventoryCommand,
    ) -> Result<InventoryEvent, InventoryError> {
        let InventoryCommand::UpdateItem(cmd) = command else {
            return Err(handler_mismatch(CommandKind::UpdateItem, command));
        };
        Ok(InventoryEvent::item_updated(
            self.aggregate_id,
            cmd.id,
            cmd.item.clone(),
            cmd.quantity,
        ))
    }
}

// Event appliers
impl Inventory {
    pub fn apply_item_added(&mut self, event: &InventoryEvent) -> Result<(), InventoryError> {
        let InventoryEvent::ItemAdded(data) = event else {
            return Err(applier_mismatch(EventKind::ItemAdded, event));
        };
        self.items.insert(
            data.id,
            InventoryItem::new(data.aggregate_id, data.id, data.item.clone(), data.quantity),
        );
        self.highest_assigned_id = self.highest_assigned_id.max(data.id);
        Ok(())
    }

    pub fn apply_item_removed(&mut self, event: &InventoryEvent) -> Result<(), InventoryError> {
        let InventoryEvent::ItemRemoved(data) = event else {
            return Err(applier_mismatch(EventKind::ItemRemoved, event));
        };
        self.items.remove(&data.id);
        Ok(())
    }

    pub fn apply_item_updated(&mut self, event: &InventoryEvent) -> Result<(), InventoryError> {
        let InventoryEvent::ItemUpdated(data) = event else {
            return Err(applier_mismatch(EventKind::ItemUpdated, event));
        };
        let item = self
            .items
            .get_mut(&data.id)
            .ok_or(InventoryError::NotFound { id: data.id })?;
        item.item = data.item.clone();
        item.quantity = data.quantity;
        Ok(())
    }

    pub(crate) fn advance_version(&mut self) {
        self.version = self.version.next();
    }
}

fn handler_mismatch(expected: CommandKind, command: &InventoryCommand) -> InventoryError {
    InventoryError::Configuration(format!(
        "{expected} handler received a {} command",
        command.kind()
    ))
}

fn applier_mismatch(expected: EventKind, event: &InventoryEvent) -> InventoryError {
    InventoryError::Configuration(format!(
        "{expected} applier received a {} event",
        event.kind()
    ))
}
