//! Events: registry, dispatcher, publisher, consumer loops and the bus facade.

mod bus;
mod consumer;
mod dispatcher;
mod publisher;
mod registry;

pub use bus::EventBus;
pub use consumer::DeliveryPolicy;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use publisher::EventPublisher;
pub use registry::{EventKind, HandlerKind, HandlerRegistry, Registration};
