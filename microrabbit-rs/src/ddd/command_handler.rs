//! Handler contracts. Handlers are types; the bus and mediator call `handle` on them.

use async_trait::async_trait;

use crate::core::HandlerError;
use crate::domain::{Command, Event};

/// Handler for command `C`. Register it with [`crate::InProcessMediator::register`].
#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: Command,
{
    async fn handle(&self, command: C) -> Result<C::Reply, HandlerError>;
}

/// Handler for event `E`.
///
/// A fresh instance is built for every delivered message, from `Default`
/// ([`crate::EventBus::subscribe`]) or from a factory
/// ([`crate::EventBus::subscribe_with`]), so no state carries over between messages.
#[async_trait]
pub trait EventHandler<E>: Send + Sync
where
    E: Event,
{
    async fn handle(&self, event: &E) -> Result<(), HandlerError>;
}
