//! microrabbit: an in-process event bus bridged to a message broker.
//!
//! Commands are routed to a local [`Mediator`] and never leave the process.
//! Events are serialized to JSON, published to a destination named after the
//! event type, and consumed by one loop per subscribed event kind that fans
//! each message out to every registered [`EventHandler`].
//!
//! ```ignore
//! let bus = EventBus::in_process(Arc::new(InMemoryBroker::new()));
//! bus.subscribe::<OrderCreated, SendConfirmation>().await?;
//! bus.publish(&OrderCreated { order_id: "42".into(), timestamp: now() }).await?;
//! ```

extern crate self as microrabbit;

pub mod core;
pub mod ddd;
pub mod domain;
pub mod events;

pub use crate::core::{init_tracing, logging, AckMode, BusConfig, BusError, HandlerError, LogFormat};
pub use ddd::{CommandHandler, EventHandler, InProcessMediator, Mediator};
pub use domain::{now, Command, Event, Message, Timestamp};
pub use events::{
    DeliveryPolicy, DispatchOutcome, EventBus, EventKind, EventPublisher, HandlerKind, HandlerRegistry,
    Registration,
};
pub use microrabbit_core::{
    AmqpBroker, AmqpConfig, Broker, BrokerError, Delivery, DeliveryStream, InMemoryBroker, QueueStats,
};
pub use microrabbit_macros::{Command, Event};
