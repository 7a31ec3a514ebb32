//! Dispatch tables from command/event kind to the function that handles it.
//!
//! Both tables are filled once, validated for completeness, and only then
//! handed to a running aggregate. A kind without an entry is a configuration
//! error reported at startup rather than when the first message of that kind
//! shows up.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use common::AggregateId;

use crate::aggregate::Aggregate;

use super::aggregate::Inventory;
use super::commands::{CommandKind, InventoryCommand};
use super::events::{EventKind, InventoryEvent};
use super::InventoryError;

/// A closed set of message kinds that a [`DispatchTable`] must cover.
pub trait DispatchKind: Copy + Eq + Hash + fmt::Display + Send + Sync + 'static {
    const ALL: &'static [Self];
}

/// Turns a command into the event it produces, without mutating state.
pub type Handler = fn(&Inventory, &InventoryCommand) -> Result<InventoryEvent, InventoryError>;

/// Applies one event to the projection. Must leave state untouched on error.
pub type Applier = fn(&mut Inventory, &InventoryEvent) -> Result<(), InventoryError>;

pub struct DispatchTable<K, F> {
    table: &'static str,
    entries: HashMap<K, F>,
}

pub type HandlerRegistry = DispatchTable<CommandKind, Handler>;
pub type ApplierRegistry = DispatchTable<EventKind, Applier>;

impl<K: DispatchKind, F: Copy> DispatchTable<K, F> {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            entries: HashMap::with_capacity(K::ALL.len()),
        }
    }

    /// Adds the entry for `kind`. Each kind may be registered once.
    pub fn register(&mut self, kind: K, entry: F) -> Result<(), InventoryError> {
        if self.entries.contains_key(&kind) {
            return Err(InventoryError::Configuration(format!(
                "{} already has an entry for {kind}",
                self.table
            )));
        }
        self.entries.insert(kind, entry);
        Ok(())
    }

    /// Checks that every kind in `K::ALL` has an entry.
    pub fn validate(&self) -> Result<(), InventoryError> {
        let missing: Vec<String> = K::ALL
            .iter()
            .filter(|kind| !self.entries.contains_key(kind))
            .map(ToString::to_string)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(InventoryError::Configuration(format!(
                "{} has no entry for {}",
                self.table,
                missing.join(", ")
            )))
        }
    }

    pub fn resolve(&self, kind: K) -> Result<F, InventoryError> {
        self.entries.get(&kind).copied().ok_or_else(|| {
            InventoryError::Configuration(format!("{} has no entry for {kind}", self.table))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: DispatchKind, F> fmt::Debug for DispatchTable<K, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<String> = self.entries.keys().map(ToString::to_string).collect();
        f.debug_struct("DispatchTable")
            .field("table", &self.table)
            .field("kinds", &kinds)
            .finish()
    }
}

/// The validated pair of tables an inventory aggregate runs on.
#[derive(Debug)]
pub struct InventoryDispatch {
    handlers: HandlerRegistry,
    appliers: ApplierRegistry,
}

impl InventoryDispatch {
    /// Closes registration: both tables must cover every kind.
    pub fn new(handlers: HandlerRegistry, appliers: ApplierRegistry) -> Result<Self, InventoryError> {
        handlers.validate()?;
        appliers.validate()?;
        Ok(Self { handlers, appliers })
    }

    /// The inventory's own handlers and appliers.
    pub fn standard() -> Result<Self, InventoryError> {
        Self::new(Self::standard_handlers()?, Self::standard_appliers()?)
    }

    pub fn standard_handlers() -> Result<HandlerRegistry, InventoryError> {
        let mut handlers = HandlerRegistry::new("command handler table");
        handlers.register(CommandKind::AddItem, Inventory::handle_add_item)?;
        handlers.register(CommandKind::RemoveItem, Inventory::handle_remove_item)?;
        handlers.register(CommandKind::UpdateItem, Inventory::handle_update_item)?;
        Ok(handlers)
    }

    pub fn standard_appliers() -> Result<ApplierRegistry, InventoryError> {
        let mut appliers = ApplierRegistry::new("event applier table");
        appliers.register(EventKind::ItemAdded, Inventory::apply_item_added)?;
        appliers.register(EventKind::ItemRemoved, Inventory::apply_item_removed)?;
        appliers.register(EventKind::ItemUpdated, Inventory::apply_item_updated)?;
        Ok(appliers)
    }

    /// Resolves the event a command produces against the current state.
    pub fn handle(
        &self,
        state: &Inventory,
        command: &InventoryCommand,
    ) -> Result<InventoryEvent, InventoryError> {
        let handler = self.handlers.resolve(command.kind())?;
        handler(state, command)
    }

    /// Applies one event and advances the version.
    pub fn apply(&self, state: &mut Inventory, event: &InventoryEvent) -> Result<(), InventoryError> {
        let applier = self.appliers.resolve(event.kind())?;
        applier(state, event)?;
        state.advance_version();
        Ok(())
    }

    /// Handles a command against `state` and returns the event together with
    /// the state it leads to. `state` itself is not touched, so the caller can
    /// persist the event before committing.
    pub fn execute(
        &self,
        state: &Inventory,
        command: &InventoryCommand,
    ) -> Result<(InventoryEvent, Inventory), InventoryError> {
        let event = self.handle(state, command)?;
        let mut next = state.clone();
        self.apply(&mut next, &event)?;
        Ok((event, next))
    }

    /// Folds a complete history, oldest first, into a fresh projection.
    pub fn rebuild(
        &self,
        aggregate_id: AggregateId,
        events: impl IntoIterator<Item = InventoryEvent>,
    ) -> Result<Inventory, InventoryError> {
        let mut state = Inventory::new(aggregate_id);
        for event in events {
            self.apply(&mut state, &event)?;
        }
        tracing::debug!(%aggregate_id, version = %state.version(), "projection rebuilt");
        Ok(state)
    }
}
