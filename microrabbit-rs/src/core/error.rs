//! Bus errors. Broker failures come through as `BusError::Broker`.

use microrabbit_core::BrokerError;
use thiserror::Error;

/// Error returned by event and command handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("handler {handler} already registered for '{event}'")]
    DuplicateHandler { event: String, handler: &'static str },
    #[error("event name '{name}' already belongs to {existing}, cannot register {incoming}")]
    EventNameConflict {
        name: String,
        existing: &'static str,
        incoming: &'static str,
    },
    #[error("handlers registered for '{0}' but its event type is unknown")]
    UnresolvedEventType(String),
    #[error("serializing '{event}' failed: {source}")]
    Serialization {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("payload for '{event}' could not be deserialized: {source}")]
    Deserialization {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("handler {handler} failed on '{event}': {source}")]
    Handler {
        event: String,
        handler: &'static str,
        #[source]
        source: HandlerError,
    },
    #[error("no handler registered for command '{0}'")]
    CommandHandlerNotFound(String),
    #[error("command '{command}' failed: {source}")]
    Command {
        command: String,
        #[source]
        source: HandlerError,
    },
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("event bus is shutting down")]
    ShuttingDown,
    #[error("consumer loop for '{event}' aborted: {message}")]
    Consumer { event: String, message: String },
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl BusError {
    /// Invariant violations: the registry or a consumer loop is in a state that should be unreachable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BusError::UnresolvedEventType(_) | BusError::Consumer { .. }
        )
    }
}
