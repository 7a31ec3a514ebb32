//! Inventory commands and their wire envelope.

use std::fmt;

use command_bus::{Delivery, ListenerDescriptor, RoutedCommand};
use common::{AggregateId, ItemId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use super::InventoryError;
use super::registry::DispatchKind;

/// Listener name every inventory command is routed under.
pub const LISTENER_NAME: &str = "InventoryAggregate";

/// Request to add a new item. The aggregate assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddItem {
    pub item: String,
    pub quantity: i32,
}

impl AddItem {
    pub fn new(item: impl Into<String>, quantity: i32) -> Self {
        Self {
            item: item.into(),
            quantity,
        }
    }
}

/// Request to remove an item. Removing an absent id is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoveItem {
    pub id: ItemId,
}

impl RemoveItem {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self { id: id.into() }
    }
}

/// Request to overwrite the name and quantity of an existing item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateItem {
    pub id: ItemId,
    pub item: String,
    pub quantity: i32,
}

impl UpdateItem {
    pub fn new(id: impl Into<ItemId>, item: impl Into<String>, quantity: i32) -> Self {
        Self {
            id: id.into(),
            item: item.into(),
            quantity,
        }
    }
}

/// Commands accepted by the inventory aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Kind")]
pub enum InventoryCommand {
    AddItem(AddItem),
    RemoveItem(RemoveItem),
    UpdateItem(UpdateItem),
}

impl InventoryCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            InventoryCommand::AddItem(_) => CommandKind::AddItem,
            InventoryCommand::RemoveItem(_) => CommandKind::RemoveItem,
            InventoryCommand::UpdateItem(_) => CommandKind::UpdateItem,
        }
    }

    pub fn add_item(item: impl Into<String>, quantity: i32) -> Self {
        InventoryCommand::AddItem(AddItem::new(item, quantity))
    }

    pub fn remove_item(id: impl Into<ItemId>) -> Self {
        InventoryCommand::RemoveItem(RemoveItem::new(id))
    }

    pub fn update_item(id: impl Into<ItemId>, item: impl Into<String>, quantity: i32) -> Self {
        InventoryCommand::UpdateItem(UpdateItem::new(id, item, quantity))
    }
}

/// Discriminant of [`InventoryCommand`], used as the handler table key and
/// to derive the bus routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    AddItem,
    RemoveItem,
    UpdateItem,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::AddItem => "AddItem",
            CommandKind::RemoveItem => "RemoveItem",
            CommandKind::UpdateItem => "UpdateItem",
        }
    }

    pub fn routing_key(&self) -> &'static str {
        match self {
            CommandKind::AddItem => "AddItemToInventoryCommand",
            CommandKind::RemoveItem => "RemoveItemFromInventoryCommand",
            CommandKind::UpdateItem => "UpdateItemInInventoryCommand",
        }
    }

    pub fn listener(&self) -> ListenerDescriptor {
        ListenerDescriptor::new(LISTENER_NAME, self.routing_key())
    }
}

impl DispatchKind for CommandKind {
    const ALL: &'static [Self] = &[
        CommandKind::AddItem,
        CommandKind::RemoveItem,
        CommandKind::UpdateItem,
    ];
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command as it travels over the bus.
///
/// Serialized flat: `{"Kind", "AggregateId", "Version"?, ...command fields}`.
/// `Version`, when present, is the aggregate version the sender expects; a
/// mismatch rejects the command. A sender that writes `Version: 0` on every
/// command gets everything after the first rejected, so senders that do not
/// track versions must leave the field out. A nil `AggregateId` means
/// "whichever aggregate receives it".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandEnvelope {
    #[serde(default = "AggregateId::nil")]
    pub aggregate_id: AggregateId,

    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<Version>,

    #[serde(flatten)]
    pub command: InventoryCommand,
}

impl CommandEnvelope {
    pub fn new(aggregate_id: AggregateId, command: InventoryCommand) -> Self {
        Self {
            aggregate_id,
            expected_version: None,
            command,
        }
    }

    pub fn expecting_version(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Decodes a delivery, checking the payload matches the routing key it
    /// arrived on.
    pub fn from_delivery(delivery: &Delivery) -> Result<Self, InventoryError> {
        let envelope: CommandEnvelope = serde_json::from_slice(&delivery.body)
            .map_err(|e| InventoryError::Deserialization(e.to_string()))?;

        let kind = envelope.command.kind();
        if kind.routing_key() != delivery.listener.routing_key {
            return Err(InventoryError::Deserialization(format!(
                "{kind} command delivered on routing key {}",
                delivery.listener.routing_key
            )));
        }

        Ok(envelope)
    }
}

impl RoutedCommand for CommandEnvelope {
    fn listener(&self) -> ListenerDescriptor {
        self.command.kind().listener()
    }
}
