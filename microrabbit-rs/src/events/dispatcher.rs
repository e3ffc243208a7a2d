//! Dispatcher: raw message for an event name -> every handler registered for it.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, instrument};

use super::registry::HandlerRegistry;
use crate::core::BusError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nobody in this process is interested in the event name; the message was dropped.
    NoHandlers,
    /// Every handler completed successfully.
    Handled { handlers: usize },
}

/// Routes raw payloads through the shared registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<RwLock<HandlerRegistry>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<RwLock<HandlerRegistry>>) -> Self {
        Self { registry }
    }

    /// Decode `payload` as the event registered under `name` and run its handlers.
    ///
    /// Handlers run one after another in registration order, each on a fresh
    /// instance; the first failure stops the sequence and is returned. The
    /// registry lock is released before any handler is awaited.
    #[instrument(level = "debug", skip(self, payload), fields(bytes = payload.len()))]
    pub async fn process_event(&self, name: &str, payload: &[u8]) -> Result<DispatchOutcome, BusError> {
        let prepared = {
            let registry = self.registry.read();
            if registry.lookup(name).is_empty() {
                debug!(event = name, "no handlers registered, dropping message");
                return Ok(DispatchOutcome::NoHandlers);
            }
            registry.prepare(name, payload)?
        };
        let handlers = prepared.await?;
        debug!(event = name, handlers, "event dispatched");
        Ok(DispatchOutcome::Handled { handlers })
    }
}
