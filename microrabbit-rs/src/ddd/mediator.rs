//! Local command routing: command type -> one handler, called in-process.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::command_handler::CommandHandler;
use crate::core::BusError;
use crate::domain::Command;

/// Routes a command to its handler and returns the handler's result.
#[async_trait]
pub trait Mediator: Send + Sync + 'static {
    async fn send<C: Command>(&self, command: C) -> Result<C::Reply, BusError>;
}

/// Mediator backed by a table of handlers keyed by command type.
#[derive(Default)]
pub struct InProcessMediator {
    // TypeId of C -> Arc<dyn CommandHandler<C>>
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl InProcessMediator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `C`, replacing any previous one.
    pub fn register<C, H>(&mut self, handler: H) -> &mut Self
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let handler: Arc<dyn CommandHandler<C>> = Arc::new(handler);
        self.handlers.insert(TypeId::of::<C>(), Box::new(handler));
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_handler<C, H>(mut self, handler: H) -> Self
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        self.register::<C, H>(handler);
        self
    }

    pub fn handles<C: Command>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<C>())
    }

    fn resolve<C: Command>(&self) -> Option<Arc<dyn CommandHandler<C>>> {
        self.handlers
            .get(&TypeId::of::<C>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<dyn CommandHandler<C>>>())
            .cloned()
    }
}

#[async_trait]
impl Mediator for InProcessMediator {
    async fn send<C: Command>(&self, command: C) -> Result<C::Reply, BusError> {
        let name = C::name();
        let handler = self
            .resolve::<C>()
            .ok_or_else(|| BusError::CommandHandlerNotFound(name.to_owned()))?;
        debug!(command = name, "dispatching command");
        handler.handle(command).await.map_err(|source| BusError::Command {
            command: name.to_owned(),
            source,
        })
    }
}
