//! Mailbox runtime for one inventory aggregate.
//!
//! Every command for an aggregate goes through a single unbounded mailbox
//! drained by one worker task. The worker runs handle, apply and append to
//! completion before it looks at the next message, so commands are handled
//! one at a time in arrival order no matter how many producers there are.
//! Each outcome, applied or rejected, is broadcast as a [`Notification`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use command_bus::{CommandBus, Delivery, DeliveryHandler, HandlerFuture, ListenerDescriptor};
use common::AggregateId;
use event_store::{AppendOptions, EventStore, Version};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::inventory::{
    ApplierRegistry, CommandEnvelope, CommandKind, DispatchKind, HandlerRegistry, Inventory,
    InventoryCommand, InventoryDispatch, InventoryError, InventoryEvent, InventorySnapshot,
};

/// Default size of the notification buffer per aggregate.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// Runtime settings for an aggregate.
#[derive(Debug, Clone)]
pub struct AggregateConfig {
    /// Notifications buffered per subscriber before a slow one starts lagging.
    pub notification_capacity: usize,
}

impl AggregateConfig {
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

/// What happened to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The command produced `event`, which was applied and recorded.
    Applied {
        event: InventoryEvent,
        snapshot: InventorySnapshot,
    },

    /// The command produced no event. `command` is `None` when the payload
    /// could not be decoded.
    Rejected {
        command: Option<InventoryCommand>,
        error: InventoryError,
    },
}

/// Published after every command outcome, in handling order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub aggregate_id: AggregateId,

    /// Aggregate version once the outcome took effect.
    pub version: Version,

    pub outcome: Outcome,
}

impl Notification {
    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, Outcome::Applied { .. })
    }

    /// The projection after the change, for applied outcomes.
    pub fn snapshot(&self) -> Option<&InventorySnapshot> {
        match &self.outcome {
            Outcome::Applied { snapshot, .. } => Some(snapshot),
            Outcome::Rejected { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&InventoryError> {
        match &self.outcome {
            Outcome::Applied { .. } => None,
            Outcome::Rejected { error, .. } => Some(error),
        }
    }
}

enum Message {
    Command {
        envelope: CommandEnvelope,
        delivery_tag: Option<u64>,
    },
    Malformed(InventoryError),
    Snapshot(oneshot::Sender<InventorySnapshot>),
    Shutdown,
}

/// Handle to a running inventory aggregate.
///
/// Commands arrive either through the bus routes registered at spawn or
/// through [`InventoryAggregate::submit`]. Both feed the same mailbox.
pub struct InventoryAggregate {
    aggregate_id: AggregateId,
    mailbox: mpsc::UnboundedSender<Message>,
    notifications: broadcast::Sender<Notification>,
    bus: Arc<dyn CommandBus>,
    routes: Arc<Mutex<Vec<ListenerDescriptor>>>,
    stopped: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl InventoryAggregate {
    /// Starts an aggregate with the standard inventory handlers and appliers.
    pub async fn spawn<S, B>(
        aggregate_id: AggregateId,
        store: S,
        bus: Arc<B>,
        config: AggregateConfig,
    ) -> Result<Self, DomainError>
    where
        S: EventStore + 'static,
        B: CommandBus + 'static,
    {
        Self::spawn_with(
            aggregate_id,
            store,
            bus,
            config,
            InventoryDispatch::standard_handlers()?,
            InventoryDispatch::standard_appliers()?,
        )
        .await
    }

    /// Starts an aggregate with caller-supplied dispatch tables.
    ///
    /// The tables are validated first, then the history is replayed, and
    /// only then are bus routes registered and the worker started. Any
    /// failure along the way means no command is ever accepted.
    #[tracing::instrument(skip(store, bus, config, handlers, appliers))]
    pub async fn spawn_with<S, B>(
        aggregate_id: AggregateId,
        store: S,
        bus: Arc<B>,
        config: AggregateConfig,
        handlers: HandlerRegistry,
        appliers: ApplierRegistry,
    ) -> Result<Self, DomainError>
    where
        S: EventStore + 'static,
        B: CommandBus + 'static,
    {
        let dispatch = InventoryDispatch::new(handlers, appliers).inspect_err(|error| {
            tracing::error!(%error, "dispatch tables incomplete, aggregate not started");
        })?;

        let state = load_inventory(&store, aggregate_id, &dispatch).await?;
        tracing::info!(version = %state.version(), items = state.item_count(), "aggregate rebuilt");

        let (mailbox, inbox) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        let bus: Arc<dyn CommandBus> = bus;

        // Deliveries queue in the mailbox until the worker starts.
        let routes = Arc::new(Mutex::new(Vec::with_capacity(CommandKind::ALL.len())));
        for route in inventory_routes() {
            let registered = bus
                .register_handler(route.clone(), delivery_handler(mailbox.clone()))
                .await;
            match registered {
                Ok(()) => routes.lock().await.push(route),
                Err(error) => {
                    tracing::error!(%route, %error, "failed to register bus route");
                    unregister_routes(bus.as_ref(), &routes).await;
                    return Err(error.into());
                }
            }
        }

        let stopped = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            aggregate_id,
            state,
            dispatch,
            store,
            notifications: notifications.clone(),
            bus: Arc::clone(&bus),
            routes: Arc::clone(&routes),
            stopped: Arc::clone(&stopped),
        };
        let worker = tokio::spawn(worker.run(inbox));

        Ok(Self {
            aggregate_id,
            mailbox,
            notifications,
            bus,
            routes,
            stopped,
            worker,
        })
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// Receives every notification published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Enqueues a command. Returns as soon as it is queued; the outcome is
    /// reported as a notification.
    ///
    /// Fails with [`DomainError::AggregateStopped`] once the aggregate has
    /// shut down or stopped on a fatal error.
    pub fn submit(&self, envelope: CommandEnvelope) -> Result<(), DomainError> {
        if self.is_stopped() {
            return Err(DomainError::AggregateStopped(self.aggregate_id));
        }
        self.mailbox
            .send(Message::Command {
                envelope,
                delivery_tag: None,
            })
            .map_err(|_| DomainError::AggregateStopped(self.aggregate_id))
    }

    /// Enqueues a command addressed to this aggregate.
    pub fn submit_command(&self, command: InventoryCommand) -> Result<(), DomainError> {
        self.submit(CommandEnvelope::new(self.aggregate_id, command))
    }

    /// Whether a fatal error stopped the aggregate. A stopped aggregate has
    /// no bus routes and refuses new commands, but still answers snapshots.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Current projection, taken after every command queued before this call.
    pub async fn snapshot(&self) -> Result<InventorySnapshot, DomainError> {
        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(Message::Snapshot(reply))
            .map_err(|_| DomainError::AggregateStopped(self.aggregate_id))?;
        response
            .await
            .map_err(|_| DomainError::AggregateStopped(self.aggregate_id))
    }

    /// Unregisters the bus routes, lets the worker finish what is already
    /// queued and waits for it to exit.
    #[tracing::instrument(skip(self), fields(aggregate_id = %self.aggregate_id))]
    pub async fn shutdown(self) -> Result<(), DomainError> {
        unregister_routes(self.bus.as_ref(), &self.routes).await;
        // Fails only if the worker already stopped on its own.
        let _ = self.mailbox.send(Message::Shutdown);
        drop(self.mailbox);
        self.worker.await?;
        tracing::info!("aggregate shut down");
        Ok(())
    }
}

/// Replays an aggregate's full history from the log.
///
/// The history must be gapless from version 1, so the rebuilt version equals
/// the number of recorded events.
#[tracing::instrument(skip(store, dispatch))]
pub async fn load_inventory<S: EventStore + ?Sized>(
    store: &S,
    aggregate_id: AggregateId,
    dispatch: &InventoryDispatch,
) -> Result<Inventory, DomainError> {
    let history = store.load(aggregate_id).await?;

    let mut expected = Version::initial();
    let mut events = Vec::with_capacity(history.len());
    for envelope in &history {
        expected = expected.next();
        if envelope.version != expected {
            return Err(InventoryError::ConcurrencyConflict {
                expected,
                actual: envelope.version,
            }
            .into());
        }
        events.push(InventoryEvent::from_envelope(envelope)?);
    }

    Ok(dispatch.rebuild(aggregate_id, events)?)
}

/// Removes the routes still held. Later sends to them fail with
/// `BusError::NoRoute`.
async fn unregister_routes(bus: &dyn CommandBus, routes: &Mutex<Vec<ListenerDescriptor>>) {
    let routes = std::mem::take(&mut *routes.lock().await);
    for route in &routes {
        bus.unregister_handler(route).await;
    }
}

fn delivery_handler(mailbox: mpsc::UnboundedSender<Message>) -> DeliveryHandler {
    Arc::new(move |delivery: Delivery| -> HandlerFuture {
        let mailbox = mailbox.clone();
        Box::pin(async move {
            let message = match CommandEnvelope::from_delivery(&delivery) {
                Ok(envelope) => Message::Command {
                    envelope,
                    delivery_tag: Some(delivery.delivery_tag),
                },
                Err(error) => {
                    tracing::error!(
                        listener = %delivery.listener,
                        delivery_tag = delivery.delivery_tag,
                        %error,
                        "dropping malformed command"
                    );
                    Message::Malformed(error)
                }
            };
            if mailbox.send(message).is_err() {
                tracing::warn!(
                    listener = %delivery.listener,
                    delivery_tag = delivery.delivery_tag,
                    "aggregate shut down, delivery discarded"
                );
            }
        })
    })
}

struct Worker<S> {
    aggregate_id: AggregateId,
    state: Inventory,
    dispatch: InventoryDispatch,
    store: S,
    notifications: broadcast::Sender<Notification>,
    bus: Arc<dyn CommandBus>,
    routes: Arc<Mutex<Vec<ListenerDescriptor>>>,
    stopped: Arc<AtomicBool>,
}

impl<S: EventStore> Worker<S> {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = inbox.recv().await {
            match message {
                Message::Command {
                    envelope,
                    delivery_tag,
                } => {
                    if self.stopped.load(Ordering::Acquire) {
                        self.reject(Some(envelope.command), InventoryError::Stopped);
                        continue;
                    }
                    let started = Instant::now();
                    let result = self.handle_command(&envelope, delivery_tag).await;
                    metrics::histogram!("inventory_command_duration_seconds")
                        .record(started.elapsed().as_secs_f64());

                    if let Err(error) = result {
                        if error.is_fatal() {
                            self.stop(&error).await;
                        }
                        self.reject(Some(envelope.command), error);
                    }
                }
                Message::Malformed(error) => self.reject(None, error),
                Message::Snapshot(reply) => {
                    let _ = reply.send(self.state.snapshot());
                }
                Message::Shutdown => inbox.close(),
            }
        }
        tracing::debug!(aggregate_id = %self.aggregate_id, "mailbox drained");
    }

    #[tracing::instrument(
        skip(self, envelope),
        fields(aggregate_id = %self.aggregate_id, kind = %envelope.command.kind())
    )]
    async fn handle_command(
        &mut self,
        envelope: &CommandEnvelope,
        delivery_tag: Option<u64>,
    ) -> Result<(), InventoryError> {
        metrics::counter!("inventory_commands_total", "kind" => envelope.command.kind().as_str())
            .increment(1);

        if !envelope.aggregate_id.is_nil() && envelope.aggregate_id != self.aggregate_id {
            return Err(InventoryError::WrongAggregate {
                expected: self.aggregate_id,
                actual: envelope.aggregate_id,
            });
        }

        let current = self.state.version();
        if let Some(expected) = envelope.expected_version
            && expected != current
        {
            return Err(InventoryError::ConcurrencyConflict {
                expected,
                actual: current,
            });
        }

        let (event, next) = self.dispatch.execute(&self.state, &envelope.command)?;
        let record = next.envelope_for(&event)?;
        self.store
            .append(vec![record], AppendOptions::expect_version(current))
            .await?;
        self.state = next;

        let version = self.state.version();
        metrics::counter!("inventory_events_applied_total", "kind" => event.kind().as_str())
            .increment(1);
        tracing::info!(
            ?delivery_tag,
            event = %event.kind(),
            item_id = %event.item_id(),
            %version,
            "event applied"
        );

        self.publish(Outcome::Applied {
            event,
            snapshot: self.state.snapshot(),
        });
        Ok(())
    }

    /// Refuses everything from now on. Routes are removed so bus senders get
    /// an error; commands already queued are rejected with `Stopped`.
    async fn stop(&self, error: &InventoryError) {
        tracing::error!(
            aggregate_id = %self.aggregate_id,
            %error,
            "fatal error, aggregate stops accepting commands"
        );
        self.stopped.store(true, Ordering::Release);
        unregister_routes(self.bus.as_ref(), &self.routes).await;
    }

    fn reject(&self, command: Option<InventoryCommand>, error: InventoryError) {
        metrics::counter!("inventory_commands_rejected_total").increment(1);
        tracing::warn!(
            aggregate_id = %self.aggregate_id,
            kind = ?command.as_ref().map(InventoryCommand::kind),
            %error,
            "command rejected"
        );
        self.publish(Outcome::Rejected { command, error });
    }

    fn publish(&self, outcome: Outcome) {
        // No subscribers is not an error.
        let _ = self.notifications.send(Notification {
            aggregate_id: self.aggregate_id,
            version: self.state.version(),
            outcome,
        });
    }
}

impl std::fmt::Debug for InventoryAggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryAggregate")
            .field("aggregate_id", &self.aggregate_id)
            .field("subscribers", &self.notifications.receiver_count())
            .finish()
    }
}

/// The bus routes an inventory aggregate listens on.
pub fn inventory_routes() -> Vec<ListenerDescriptor> {
    CommandKind::ALL.iter().map(CommandKind::listener).collect()
}
