//! Message model: commands are handled in-process, events travel through the broker.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Creation time carried by every message.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Current time, for filling a message's timestamp field.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Base shape of commands and events: a name and a creation timestamp.
///
/// Usually derived: `#[derive(Event)]` or `#[derive(Command)]`.
pub trait Message {
    /// Wire name. For events this is also the broker destination.
    fn name() -> &'static str
    where
        Self: Sized;

    fn timestamp(&self) -> Timestamp;
}

/// Handled synchronously by the local mediator; never placed on the broker.
pub trait Command: Message + Send + 'static {
    /// What the command handler returns on success.
    type Reply: Send + 'static;
}

/// Serialized to JSON and published to the destination named [`Message::name`].
pub trait Event: Message + Serialize + DeserializeOwned + Send + Sync + 'static {}
