//! Integration tests for the inventory aggregate.
//!
//! These drive the aggregate through the command bus and the event log the
//! way a deployed service would, and check ordering, replay and failure
//! reporting end to end.

use std::sync::Arc;
use std::time::Duration;

use command_bus::{BusError, CommandBus, CommandBusExt, InMemoryCommandBus};
use common::{AggregateId, ItemId};
use domain::inventory::{CommandKind, HandlerRegistry, LISTENER_NAME};
use domain::{
    AggregateConfig, CommandEnvelope, DomainError, Inventory, InventoryAggregate,
    InventoryCommand, InventoryDispatch, InventoryError, InventoryEvent, Notification, Outcome,
    load_inventory,
};
use event_store::{EventEnvelope, EventStore, InMemoryEventStore, Version};
use tokio::sync::broadcast;

async fn spawn(
    aggregate_id: AggregateId,
    store: &InMemoryEventStore,
    bus: &Arc<InMemoryCommandBus>,
) -> InventoryAggregate {
    InventoryAggregate::spawn(
        aggregate_id,
        store.clone(),
        Arc::clone(bus),
        AggregateConfig::default(),
    )
    .await
    .unwrap()
}

async fn collect(rx: &mut broadcast::Receiver<Notification>, count: usize) -> Vec<Notification> {
    let mut notifications = Vec::with_capacity(count);
    for _ in 0..count {
        let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("notification channel closed");
        notifications.push(notification);
    }
    notifications
}

fn reference_commands() -> Vec<InventoryCommand> {
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

fn rows(inventory: &Inventory) -> Vec<(u32, String, i32)> {
    inventory
        .items()
        .map(|item| (item.id.as_u32(), item.item.clone(), item.quantity))
        .collect()
}

mod reference_scenario {
    use super::*;

    #[tokio::test]
    async fn bus_driven_sequence_produces_expected_projection() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();
        let aggregate = spawn(aggregate_id, &store, &bus).await;
        let mut rx = aggregate.subscribe();

        for command in reference_commands() {
            bus.send(&CommandEnvelope::new(aggregate_id, command))
                .await
                .unwrap();
        }

        let notifications = collect(&mut rx, 9).await;
        assert!(notifications.iter().all(Notification::is_applied));

        let versions: Vec<_> = notifications.iter().map(|n| n.version.as_u64()).collect();
        assert_eq!(versions, (1..=9).collect::<Vec<_>>());

        let last = notifications.last().unwrap().snapshot().unwrap();
        let items: Vec<_> = last
            .items
            .iter()
            .map(|i| (i.id.as_u32(), i.item.as_str(), i.quantity))
            .collect();
        assert_eq!(
            items,
            vec![
                (1, "Sword", 12),
                (2, "Apple", 3),
                (4, "Banana", 1),
                (5, "Helmet", 4),
                (6, "Sword", 1),
                (7, "Sword", 12),
            ]
        );

        aggregate.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn every_event_is_recorded_in_order() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();
        let aggregate = spawn(aggregate_id, &store, &bus).await;

        for command in reference_commands() {
            aggregate.submit_command(command).unwrap();
        }
        aggregate.shutdown().await.unwrap();

        let history = store.load(aggregate_id).await.unwrap();
        let kinds: Vec<_> = history.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "ItemAdded",
                "ItemAdded",
                "ItemAdded",
                "ItemAdded",
                "ItemAdded",
                "ItemAdded",
                "ItemRemoved",
                "ItemAdded",
                "ItemUpdated",
            ]
        );
        assert!(history.iter().all(|e| e.aggregate_type == "InventoryAggregate"));
        assert_eq!(history[6].payload["Id"], 3);
        assert!(history[6].payload.get("Item").is_none());
    }
}

mod replay {
    use super::*;

    #[tokio::test]
    async fn restarted_aggregate_resumes_from_the_log() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();

        let first = spawn(aggregate_id, &store, &bus).await;
        for command in reference_commands() {
            first.submit_command(command).unwrap();
        }
        let before = first.snapshot().await.unwrap();
        first.shutdown().await.unwrap();

        let second = spawn(aggregate_id, &store, &bus).await;
        assert_eq!(second.snapshot().await.unwrap(), before);

        let mut rx = second.subscribe();
        second
            .submit_command(InventoryCommand::add_item("Shield", 1))
            .unwrap();
        let notification = collect(&mut rx, 1).await.remove(0);
        let Outcome::Applied { event, .. } = notification.outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(event.item_id(), ItemId::new(8));
        assert_eq!(notification.version, Version::new(10));

        second.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rebuilt_version_equals_log_length() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();

        let aggregate = spawn(aggregate_id, &store, &bus).await;
        for command in reference_commands() {
            aggregate.submit_command(command).unwrap();
        }
        aggregate
            .submit_command(InventoryCommand::update_item(99, "Ghost", 1))
            .unwrap();
        aggregate.shutdown().await.unwrap();

        let dispatch = InventoryDispatch::standard().unwrap();
        let rebuilt = load_inventory(&store, aggregate_id, &dispatch).await.unwrap();
        let recorded = store.current_version(aggregate_id).await.unwrap();

        assert_eq!(recorded, Version::new(9));
        assert_eq!(domain::Aggregate::version(&rebuilt), recorded);
        assert_eq!(
            rows(&rebuilt),
            vec![
                (1, "Sword".to_string(), 12),
                (2, "Apple".to_string(), 3),
                (4, "Banana".to_string(), 1),
                (5, "Helmet".to_string(), 4),
                (6, "Sword".to_string(), 1),
                (7, "Sword".to_string(), 12),
            ]
        );
    }

    #[tokio::test]
    async fn history_ending_at_the_last_id_refuses_further_additions() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();

        let last = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("InventoryAggregate")
            .event_type("ItemAdded")
            .version(Version::first())
            .payload(&InventoryEvent::item_added(
                aggregate_id,
                ItemId::new(u32::MAX),
                "Shield",
                1,
            ))
            .unwrap()
            .build()
            .unwrap();
        store
            .append(vec![last], event_store::AppendOptions::expect_new())
            .await
            .unwrap();

        let aggregate = spawn(aggregate_id, &store, &bus).await;
        let mut rx = aggregate.subscribe();

        aggregate
            .submit_command(InventoryCommand::add_item("Arrow", 1))
            .unwrap();
        aggregate
            .submit_command(InventoryCommand::remove_item(u32::MAX))
            .unwrap();

        let outcomes = collect(&mut rx, 2).await;
        assert_eq!(
            outcomes[0].error(),
            Some(&InventoryError::IdsExhausted {
                highest: ItemId::new(u32::MAX)
            })
        );
        assert_eq!(outcomes[0].version, Version::first());
        assert!(outcomes[1].is_applied());
        assert_eq!(outcomes[1].version, Version::new(2));

        assert!(!aggregate.is_stopped());
        assert_eq!(store.event_count().await, 2);
        aggregate.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_event_kind_in_log_prevents_start() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();

        let foreign = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("InventoryAggregate")
            .event_type("ItemStolen")
            .version(Version::first())
            .payload_raw(serde_json::json!({"Id": 1}))
            .build()
            .unwrap();
        store
            .append(vec![foreign], event_store::AppendOptions::expect_new())
            .await
            .unwrap();

        let result = InventoryAggregate::spawn(
            aggregate_id,
            store.clone(),
            Arc::clone(&bus),
            AggregateConfig::default(),
        )
        .await;

        assert!(matches!(
            result,
            Err(DomainError::Inventory(InventoryError::Configuration(_)))
        ));
        assert_eq!(bus.route_count().await, 0);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_get_unique_gapless_ids() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();
        let aggregate = Arc::new(spawn(aggregate_id, &store, &bus).await);
        let mut rx = aggregate.subscribe();

        let producers = 4;
        let per_producer = 25;
        let mut tasks = Vec::new();
        for producer in 0..producers {
            let bus = Arc::clone(&bus);
            tasks.push(tokio::spawn(async move {
                for n in 0..per_producer {
                    let command = InventoryCommand::add_item(format!("p{producer}-{n}"), n);
                    bus.send(&CommandEnvelope::new(aggregate_id, command))
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let total = (producers * per_producer) as usize;
        let notifications = collect(&mut rx, total).await;

        let mut ids: Vec<u32> = notifications
            .iter()
            .map(|n| match &n.outcome {
                Outcome::Applied { event, .. } => event.item_id().as_u32(),
                Outcome::Rejected { error, .. } => panic!("unexpected rejection: {error}"),
            })
            .collect();
        let versions: Vec<u64> = notifications.iter().map(|n| n.version.as_u64()).collect();

        // Handled strictly one after another: ids and versions rise together.
        assert_eq!(versions, (1..=total as u64).collect::<Vec<_>>());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        ids.dedup();
        assert_eq!(ids, (1..=total as u32).collect::<Vec<_>>());

        assert_eq!(store.event_count().await, total);

        let aggregate = Arc::try_unwrap(aggregate).unwrap();
        aggregate.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn one_producer_sees_its_commands_in_send_order() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();
        let aggregate = spawn(aggregate_id, &store, &bus).await;
        let mut rx = aggregate.subscribe();

        bus.send(&CommandEnvelope::new(aggregate_id, InventoryCommand::add_item("Sword", 1)))
            .await
            .unwrap();
        bus.send(&CommandEnvelope::new(
            aggregate_id,
            InventoryCommand::update_item(1, "Sword", 2),
        ))
        .await
        .unwrap();
        bus.send(&CommandEnvelope::new(aggregate_id, InventoryCommand::remove_item(1)))
            .await
            .unwrap();

        let kinds: Vec<_> = collect(&mut rx, 3)
            .await
            .into_iter()
            .map(|n| match n.outcome {
                Outcome::Applied { event, .. } => event.kind().as_str(),
                Outcome::Rejected { error, .. } => panic!("unexpected rejection: {error}"),
            })
            .collect();
        assert_eq!(kinds, vec!["ItemAdded", "ItemUpdated", "ItemRemoved"]);

        aggregate.shutdown().await.unwrap();
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn update_of_unknown_id_is_reported_and_aggregate_keeps_going() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();
        let aggregate = spawn(aggregate_id, &store, &bus).await;
        let mut rx = aggregate.subscribe();

        aggregate
            .submit_command(InventoryCommand::add_item("Sword", 1))
            .unwrap();
        aggregate
            .submit_command(InventoryCommand::update_item(42, "Shield", 3))
            .unwrap();
        aggregate
            .submit_command(InventoryCommand::add_item("Apple", 2))
            .unwrap();

        let notifications = collect(&mut rx, 3).await;
        assert!(notifications[0].is_applied());
        assert_eq!(
            notifications[1].error(),
            Some(&InventoryError::NotFound { id: ItemId::new(42) })
        );
        assert_eq!(notifications[1].version, Version::first());
        assert!(notifications[2].is_applied());
        assert_eq!(notifications[2].version, Version::new(2));

        assert_eq!(store.current_version(aggregate_id).await.unwrap(), Version::new(2));
        aggregate.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_payload_is_reported_and_never_applied() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();
        let aggregate = spawn(aggregate_id, &store, &bus).await;
        let mut rx = aggregate.subscribe();

        let body = br#"{"Kind":"AddItem","Item":"Sword","Quantity":"many"}"#.to_vec();
        bus.publish(CommandKind::AddItem.listener(), body)
            .await
            .unwrap();
        bus.publish(CommandKind::AddItem.listener(), b"not json".to_vec())
            .await
            .unwrap();

        let notifications = collect(&mut rx, 2).await;
        for notification in &notifications {
            match &notification.outcome {
                Outcome::Rejected { command, error } => {
                    assert!(command.is_none());
                    assert!(matches!(error, InventoryError::Deserialization(_)));
                }
                Outcome::Applied { .. } => panic!("malformed payload was applied"),
            }
        }
        assert_eq!(store.event_count().await, 0);

        aggregate.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn incomplete_handler_table_fails_at_startup() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());

        let mut handlers = HandlerRegistry::new("command handler table");
        handlers
            .register(CommandKind::AddItem, Inventory::handle_add_item)
            .unwrap();

        let result = InventoryAggregate::spawn_with(
            AggregateId::new(),
            store,
            Arc::clone(&bus),
            AggregateConfig::default(),
            handlers,
            InventoryDispatch::standard_appliers().unwrap(),
        )
        .await;

        assert!(matches!(
            result,
            Err(DomainError::Inventory(InventoryError::Configuration(_)))
        ));
        assert_eq!(bus.route_count().await, 0);
    }

    #[tokio::test]
    async fn configuration_error_at_runtime_stops_the_aggregate() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();

        // Complete table, but AddItem is wired to the wrong handler.
        let mut handlers = HandlerRegistry::new("command handler table");
        handlers
            .register(CommandKind::AddItem, Inventory::handle_update_item)
            .unwrap();
        handlers
            .register(CommandKind::RemoveItem, Inventory::handle_remove_item)
            .unwrap();
        handlers
            .register(CommandKind::UpdateItem, Inventory::handle_update_item)
            .unwrap();

        let aggregate = InventoryAggregate::spawn_with(
            aggregate_id,
            store.clone(),
            Arc::clone(&bus),
            AggregateConfig::default(),
            handlers,
            InventoryDispatch::standard_appliers().unwrap(),
        )
        .await
        .unwrap();
        let mut rx = aggregate.subscribe();

        aggregate
            .submit_command(InventoryCommand::add_item("Sword", 1))
            .unwrap();
        let notification = collect(&mut rx, 1).await.remove(0);
        assert!(matches!(
            notification.error(),
            Some(InventoryError::Configuration(_))
        ));

        let result = aggregate.submit_command(InventoryCommand::remove_item(1));
        assert!(matches!(result, Err(DomainError::AggregateStopped(id)) if id == aggregate_id));
        assert!(aggregate.is_stopped());
        assert_eq!(store.event_count().await, 0);

        aggregate.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn bus_send_after_fatal_stop_is_refused() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();

        let mut handlers = HandlerRegistry::new("command handler table");
        handlers
            .register(CommandKind::AddItem, Inventory::handle_update_item)
            .unwrap();
        handlers
            .register(CommandKind::RemoveItem, Inventory::handle_remove_item)
            .unwrap();
        handlers
            .register(CommandKind::UpdateItem, Inventory::handle_update_item)
            .unwrap();

        let aggregate = InventoryAggregate::spawn_with(
            aggregate_id,
            store.clone(),
            Arc::clone(&bus),
            AggregateConfig::default(),
            handlers,
            InventoryDispatch::standard_appliers().unwrap(),
        )
        .await
        .unwrap();
        let mut rx = aggregate.subscribe();

        bus.send(&CommandEnvelope::new(
            AggregateId::nil(),
            InventoryCommand::add_item("Sword", 1),
        ))
        .await
        .unwrap();
        let notification = collect(&mut rx, 1).await.remove(0);
        assert!(matches!(
            notification.error(),
            Some(InventoryError::Configuration(_))
        ));

        // The routes are gone, so the sender learns about the stop directly.
        let result = bus
            .send(&CommandEnvelope::new(
                AggregateId::nil(),
                InventoryCommand::remove_item(1),
            ))
            .await;
        assert!(matches!(result, Err(BusError::NoRoute(_))));
        assert_eq!(bus.route_count().await, 0);

        // Still answers queries with the state it stopped at.
        let snapshot = aggregate.snapshot().await.unwrap();
        assert_eq!(snapshot.version, Version::initial());
        assert!(snapshot.items.is_empty());

        aggregate.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn conflicting_append_leaves_state_uncommitted() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();
        let aggregate = spawn(aggregate_id, &store, &bus).await;
        let mut rx = aggregate.subscribe();

        // Another writer records an event behind the aggregate's back.
        let intruder = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("InventoryAggregate")
            .event_type("ItemAdded")
            .version(Version::first())
            .payload(&InventoryEvent::item_added(
                aggregate_id,
                ItemId::new(1),
                "Dagger",
                1,
            ))
            .unwrap()
            .build()
            .unwrap();
        store
            .append(vec![intruder], event_store::AppendOptions::expect_new())
            .await
            .unwrap();

        aggregate
            .submit_command(InventoryCommand::add_item("Sword", 1))
            .unwrap();

        let notification = collect(&mut rx, 1).await.remove(0);
        assert_eq!(
            notification.error(),
            Some(&InventoryError::ConcurrencyConflict {
                expected: Version::initial(),
                actual: Version::first(),
            })
        );
        let snapshot = aggregate.snapshot().await.unwrap();
        assert!(snapshot.items.is_empty());
        assert_eq!(snapshot.version, Version::initial());

        aggregate.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_refused_by_the_bus() {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryCommandBus::new());
        let aggregate_id = AggregateId::new();
        let aggregate = spawn(aggregate_id, &store, &bus).await;

        aggregate.shutdown().await.unwrap();

        let result = bus
            .send(&CommandEnvelope::new(aggregate_id, InventoryCommand::add_item("Sword", 1)))
            .await;
        assert!(matches!(result, Err(command_bus::BusError::NoRoute(listener)) if listener.name == LISTENER_NAME));
    }
}
