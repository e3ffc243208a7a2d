//! EventBus: the facade applications hold. Commands go to the mediator, events go
//! through the broker, subscriptions start one consumer loop per event kind.

use std::sync::Arc;

use microrabbit_core::Broker;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use super::consumer::{ConsumerHandle, DeliveryPolicy};
use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::publisher::EventPublisher;
use super::registry::{EventKind, HandlerKind, HandlerRegistry, Registration};
use crate::core::{BusConfig, BusError};
use crate::ddd::{EventHandler, InProcessMediator, Mediator};
use crate::domain::{Command, Event};

/// Bridges local commands and events to a message broker.
///
/// Share it behind an `Arc` when handlers need to send commands or publish
/// further events (see [`subscribe_with`](Self::subscribe_with)).
pub struct EventBus<M: Mediator = InProcessMediator> {
    broker: Arc<dyn Broker>,
    mediator: M,
    registry: Arc<RwLock<HandlerRegistry>>,
    publisher: EventPublisher,
    dispatcher: Dispatcher,
    consumers: Mutex<Vec<ConsumerHandle>>,
    // Held from registration until the consumer loop is running or rolled back.
    subscribe_gate: AsyncMutex<()>,
    shutdown: watch::Sender<bool>,
    policy: DeliveryPolicy,
}

impl<M: Mediator> EventBus<M> {
    pub fn new(broker: Arc<dyn Broker>, mediator: M) -> Self {
        Self::with_policy(broker, mediator, DeliveryPolicy::default())
    }

    /// Like [`new`](Self::new), taking ack mode and requeue behavior from `config`.
    pub fn with_config(broker: Arc<dyn Broker>, mediator: M, config: &BusConfig) -> Self {
        Self::with_policy(broker, mediator, DeliveryPolicy::from(config))
    }

    pub fn with_policy(broker: Arc<dyn Broker>, mediator: M, policy: DeliveryPolicy) -> Self {
        let registry = Arc::new(RwLock::new(HandlerRegistry::new()));
        let (shutdown, _) = watch::channel(false);
        Self {
            publisher: EventPublisher::new(Arc::clone(&broker)),
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            broker,
            mediator,
            registry,
            consumers: Mutex::new(Vec::new()),
            subscribe_gate: AsyncMutex::new(()),
            shutdown,
            policy,
        }
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    pub fn mediator(&self) -> &M {
        &self.mediator
    }

    /// Hand `command` to the mediator and return its reply. The broker is not involved.
    pub async fn send_command<C: Command>(&self, command: C) -> Result<C::Reply, BusError> {
        self.mediator.send(command).await
    }

    /// Serialize `event` and publish it to the destination named after its type.
    pub async fn publish<E: Event>(&self, event: &E) -> Result<(), BusError> {
        self.publisher.publish(event).await
    }

    /// Subscribe `H` to `E`, building a handler with `H::default()` per message.
    pub async fn subscribe<E, H>(&self) -> Result<Registration, BusError>
    where
        E: Event,
        H: EventHandler<E> + Default + 'static,
    {
        self.subscribe_with::<E, H, _>(H::default).await
    }

    /// Subscribe `H` to `E`, building a handler with `factory` per message.
    ///
    /// The first handler for an event kind declares its destination and starts
    /// the consumer loop; later handlers join the running loop. If the loop
    /// cannot be started the registration is undone and the broker error is
    /// returned. Subscriptions are serialized, so a concurrent subscriber for
    /// the same event kind only sees the registration once the loop is running.
    pub async fn subscribe_with<E, H, F>(&self, factory: F) -> Result<Registration, BusError>
    where
        E: Event,
        H: EventHandler<E> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let _gate = self.subscribe_gate.lock().await;
        if *self.shutdown.borrow() {
            return Err(BusError::ShuttingDown);
        }
        let registration = self.registry.write().register::<E, H, F>(factory)?;
        let event = registration.event;
        info!(
            event = event.name,
            handler = registration.handler.type_name,
            first = registration.first_for_event,
            "handler subscribed"
        );
        if !registration.first_for_event {
            return Ok(registration);
        }

        let deliveries = match self.broker.consume(event.name).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                warn!(event = event.name, error = %e, "starting consumer failed, subscription rolled back");
                self.registry.write().rollback(&registration);
                return Err(e.into());
            }
        };
        let handle = ConsumerHandle::spawn(
            event,
            deliveries,
            self.dispatcher.clone(),
            self.policy,
            self.shutdown.subscribe(),
        );
        self.consumers.lock().push(handle);
        Ok(registration)
    }

    /// Decode `payload` as the event registered under `name` and run its handlers.
    ///
    /// This is what every consumer loop calls per delivery; calling it directly
    /// bypasses the broker. An unknown name is a no-op.
    pub async fn process_event(&self, name: &str, payload: &[u8]) -> Result<DispatchOutcome, BusError> {
        self.dispatcher.process_event(name, payload).await
    }

    /// Handler types subscribed to `name`, in registration order.
    pub fn handlers_for(&self, name: &str) -> Vec<HandlerKind> {
        self.registry.read().lookup(name)
    }

    pub fn resolve_event_type(&self, name: &str) -> Result<EventKind, BusError> {
        self.registry.read().resolve_event_type(name)
    }

    /// Event kinds with at least one subscribed handler.
    pub fn event_kinds(&self) -> Vec<EventKind> {
        self.registry.read().event_kinds()
    }

    /// Consumer loops still running.
    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().iter().filter(|c| !c.is_finished()).count()
    }

    /// Stop every consumer loop after its current delivery and wait for them.
    ///
    /// Returns the first error a loop ended with. Later subscriptions fail
    /// with `ShuttingDown`; publishing and commands keep working.
    pub async fn shutdown(&self) -> Result<(), BusError> {
        let consumers = {
            let _gate = self.subscribe_gate.lock().await;
            self.shutdown.send_replace(true);
            std::mem::take(&mut *self.consumers.lock())
        };
        info!(consumers = consumers.len(), "event bus shutting down");

        let mut first_error = None;
        for consumer in consumers {
            let event = consumer.event();
            match consumer.join().await {
                Ok(()) => debug!(event = event.name, "consumer loop joined"),
                Err(e) => {
                    warn!(event = event.name, error = %e, "consumer loop ended with error");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl EventBus<InProcessMediator> {
    /// Bus over `broker` with a command mediator holding no handlers yet.
    pub fn in_process(broker: Arc<dyn Broker>) -> Self {
        Self::new(broker, InProcessMediator::new())
    }
}
