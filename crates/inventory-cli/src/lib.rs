//! Console front end for the inventory aggregate.
//!
//! Wires an aggregate to an in-memory command bus and an injected event log,
//! sends a batch of commands over the bus and prints the projection after
//! every change.

pub mod config;
pub mod error;
pub mod printer;

use std::io::Write;
use std::sync::Arc;

use command_bus::{CommandBusExt, InMemoryCommandBus};
use common::AggregateId;
use domain::{
    AggregateConfig, CommandEnvelope, InventoryAggregate, InventoryCommand, InventorySnapshot,
};
use event_store::EventStore;
use tokio::sync::broadcast::error::RecvError;

pub use config::{Config, LogFormat};
pub use error::CliError;
pub use printer::{ConsolePrinter, render_inventory};

/// The demo sequence: six additions, a removal, one more addition and an
/// update of the first item.
pub fn reference_commands() -> Vec<InventoryCommand> {
    vec![
        InventoryCommand::add_item("Sword", 1),
        InventoryCommand::add_item("Apple", 3),
        InventoryCommand::add_item("Armour", 2),
        InventoryCommand::add_item("Banana", 1),
        InventoryCommand::add_item("Helmet", 4),
        InventoryCommand::add_item("Sword", 1),
        InventoryCommand::remove_item(3),
        InventoryCommand::add_item("Sword", 12),
        InventoryCommand::update_item(1, "Sword", 12),
    ]
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub aggregate_id: AggregateId,
    pub applied: usize,
    pub rejected: usize,
    /// Outcomes that were published but dropped because the printer lagged.
    pub missed: usize,
    pub snapshot: InventorySnapshot,
}

/// Spawns an aggregate over `store`, sends `commands` through the bus and
/// prints every outcome to `out`. Returns once each command has an outcome
/// and the aggregate has shut down.
#[tracing::instrument(skip_all, fields(commands = commands.len()))]
pub async fn run<S, W>(
    store: S,
    config: &Config,
    commands: Vec<InventoryCommand>,
    out: W,
) -> Result<RunSummary, CliError>
where
    S: EventStore + 'static,
    W: Write,
{
    let aggregate_id = AggregateId::new();
    let bus = Arc::new(InMemoryCommandBus::new());
    let aggregate = InventoryAggregate::spawn(
        aggregate_id,
        store,
        Arc::clone(&bus),
        AggregateConfig::default().with_notification_capacity(config.notification_capacity),
    )
    .await?;
    let mut notifications = aggregate.subscribe();

    let expected = commands.len();
    for command in commands {
        if let Err(error) = bus.send(&CommandEnvelope::new(aggregate_id, command)).await {
            tracing::error!(%error, "aggregate refused the batch");
            aggregate.shutdown().await?;
            return Err(error.into());
        }
    }

    let mut printer = ConsolePrinter::new(out);
    let (mut applied, mut rejected, mut missed) = (0, 0, 0);
    while applied + rejected + missed < expected {
        match notifications.recv().await {
            Ok(notification) => {
                if notification.is_applied() {
                    applied += 1;
                } else {
                    rejected += 1;
                }
                printer.print(&notification)?;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "printer fell behind, notifications skipped");
                missed += skipped as usize;
            }
            Err(RecvError::Closed) => {
                return Err(CliError::NotificationsClosed {
                    received: applied + rejected + missed,
                    expected,
                });
            }
        }
    }

    let snapshot = aggregate.snapshot().await?;
    aggregate.shutdown().await?;

    metrics::gauge!("inventory_items").set(snapshot.items.len() as f64);
    tracing::info!(applied, rejected, missed, version = %snapshot.version, "run complete");

    Ok(RunSummary {
        aggregate_id,
        applied,
        rejected,
        missed,
        snapshot,
    })
}
