//! Handler registry: which event kinds are known and which handler types are subscribed to each.
//!
//! Event kinds are keyed by `TypeId`; the wire name only indexes into them, and
//! two distinct types may not share a wire name. Each kind owns a typed route
//! that knows how to decode its payload and build fresh handler instances, so
//! dispatch needs no runtime reflection.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::trace;

use crate::core::BusError;
use crate::ddd::EventHandler;
use crate::domain::Event;

/// Identity of an event type: wire name plus Rust type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventKind {
    pub name: &'static str,
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl EventKind {
    pub fn of<E: Event>() -> Self {
        Self {
            name: E::name(),
            type_id: TypeId::of::<E>(),
            type_name: type_name::<E>(),
        }
    }
}

/// Identity of a handler type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerKind {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl HandlerKind {
    pub fn of<H: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<H>(),
            type_name: type_name::<H>(),
        }
    }
}

/// Result of a successful [`HandlerRegistry::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registration {
    pub event: EventKind,
    pub handler: HandlerKind,
    /// No handler was registered for this event kind before.
    pub first_for_event: bool,
}

/// Decoded event plus the handlers to run on it, detached from the registry.
pub(crate) type PreparedDispatch = BoxFuture<'static, Result<usize, BusError>>;

type HandlerFactory<E> = Arc<dyn Fn() -> Box<dyn EventHandler<E>> + Send + Sync>;

struct HandlerSlot<E> {
    kind: HandlerKind,
    factory: HandlerFactory<E>,
}

impl<E> Clone for HandlerSlot<E> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            factory: Arc::clone(&self.factory),
        }
    }
}

trait Route: Send + Sync {
    fn handler_kinds(&self) -> Vec<HandlerKind>;
    fn prepare(&self, payload: &[u8]) -> Result<PreparedDispatch, BusError>;
    fn remove_handler(&mut self, handler: TypeId) -> bool;
    fn is_empty(&self) -> bool;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypedRoute<E> {
    kind: EventKind,
    handlers: Vec<HandlerSlot<E>>,
}

impl<E: Event> Route for TypedRoute<E> {
    fn handler_kinds(&self) -> Vec<HandlerKind> {
        self.handlers.iter().map(|slot| slot.kind).collect()
    }

    fn prepare(&self, payload: &[u8]) -> Result<PreparedDispatch, BusError> {
        let name = self.kind.name;
        let event: E =
            serde_json::from_slice(payload).map_err(|source| BusError::Deserialization {
                event: name.to_owned(),
                source,
            })?;
        let handlers = self.handlers.clone();
        Ok(async move {
            for slot in &handlers {
                let handler = (slot.factory)();
                trace!(event = name, handler = slot.kind.type_name, "invoking handler");
                handler
                    .handle(&event)
                    .await
                    .map_err(|source| BusError::Handler {
                        event: name.to_owned(),
                        handler: slot.kind.type_name,
                        source,
                    })?;
            }
            Ok(handlers.len())
        }
        .boxed())
    }

    fn remove_handler(&mut self, handler: TypeId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|slot| slot.kind.type_id != handler);
        self.handlers.len() != before
    }

    fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Event kinds and their handlers. Grows only; there is no public removal.
#[derive(Default)]
pub struct HandlerRegistry {
    names: HashMap<&'static str, EventKind>,
    routes: HashMap<TypeId, Box<dyn Route>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe handler type `H` to event `E`; `factory` builds one instance per dispatched message.
    ///
    /// Fails with `DuplicateHandler` if `H` is already registered for `E`, and with
    /// `EventNameConflict` if a different type already uses `E`'s wire name. On
    /// failure the registry is unchanged.
    pub fn register<E, H, F>(&mut self, factory: F) -> Result<Registration, BusError>
    where
        E: Event,
        H: EventHandler<E> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let event = EventKind::of::<E>();
        let handler = HandlerKind::of::<H>();

        if let Some(existing) = self.names.get(event.name) {
            if existing.type_id != event.type_id {
                return Err(BusError::EventNameConflict {
                    name: event.name.to_owned(),
                    existing: existing.type_name,
                    incoming: event.type_name,
                });
            }
        }

        let route = self.routes.entry(event.type_id).or_insert_with(|| {
            Box::new(TypedRoute::<E> {
                kind: event,
                handlers: Vec::new(),
            })
        });
        let route = route
            .as_any_mut()
            .downcast_mut::<TypedRoute<E>>()
            .ok_or_else(|| BusError::UnresolvedEventType(event.name.to_owned()))?;

        if route.handlers.iter().any(|slot| slot.kind.type_id == handler.type_id) {
            return Err(BusError::DuplicateHandler {
                event: event.name.to_owned(),
                handler: handler.type_name,
            });
        }

        let first_for_event = route.handlers.is_empty();
        route.handlers.push(HandlerSlot {
            kind: handler,
            factory: Arc::new(move || Box::new(factory()) as Box<dyn EventHandler<E>>),
        });
        self.names.insert(event.name, event);

        Ok(Registration {
            event,
            handler,
            first_for_event,
        })
    }

    /// Handler types subscribed to `name`, in registration order. Empty if none.
    pub fn lookup(&self, name: &str) -> Vec<HandlerKind> {
        self.names
            .get(name)
            .and_then(|kind| self.routes.get(&kind.type_id))
            .map(|route| route.handler_kinds())
            .unwrap_or_default()
    }

    /// The event type recorded under `name`.
    pub fn resolve_event_type(&self, name: &str) -> Result<EventKind, BusError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| BusError::UnresolvedEventType(name.to_owned()))
    }

    /// Every event kind that has at least one handler.
    pub fn event_kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<EventKind> = self.names.values().copied().collect();
        kinds.sort_by_key(|kind| kind.name);
        kinds
    }

    /// Decode `payload` as the event registered under `name` and bind the handler list.
    pub(crate) fn prepare(&self, name: &str, payload: &[u8]) -> Result<PreparedDispatch, BusError> {
        let kind = self.resolve_event_type(name)?;
        let route = self
            .routes
            .get(&kind.type_id)
            .ok_or_else(|| BusError::UnresolvedEventType(name.to_owned()))?;
        route.prepare(payload)
    }

    /// Undo a registration whose consumer could not be started.
    pub(crate) fn rollback(&mut self, registration: &Registration) {
        let event = registration.event;
        let emptied = match self.routes.get_mut(&event.type_id) {
            Some(route) => {
                route.remove_handler(registration.handler.type_id);
                route.is_empty()
            }
            None => false,
        };
        if emptied {
            self.routes.remove(&event.type_id);
            self.names.remove(event.name);
        }
    }
}
