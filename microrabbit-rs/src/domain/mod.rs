//! Domain: message, command and event traits.

pub mod message;

pub use message::{now, Command, Event, Message, Timestamp};
