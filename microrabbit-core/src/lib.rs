//! MicroRabbit core: broker boundary, deliveries, in-memory and AMQP brokers.
//!
//! Everything here deals in destinations and raw bytes. Typed events, handlers
//! and the registry live in the `microrabbit` facade.

pub mod amqp;
pub mod broker;
pub mod memory;

pub use amqp::{AmqpBroker, AmqpConfig};
pub use broker::{Acknowledger, Broker, Delivery, DeliveryStream};
pub use memory::{InMemoryBroker, QueueStats};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),
    #[error("declare of {destination} failed: {message}")]
    Declare { destination: String, message: String },
    #[error("publish to {destination} failed: {message}")]
    Publish { destination: String, message: String },
    #[error("consume from {destination} failed: {message}")]
    Consume { destination: String, message: String },
    #[error("acknowledge of delivery {delivery_tag} on {destination} failed: {message}")]
    Acknowledge {
        destination: String,
        delivery_tag: u64,
        message: String,
    },
    #[error("broker closed")]
    Closed,
}

impl BrokerError {
    pub fn declare(destination: impl Into<String>, message: impl ToString) -> Self {
        Self::Declare {
            destination: destination.into(),
            message: message.to_string(),
        }
    }

    pub fn publish(destination: impl Into<String>, message: impl ToString) -> Self {
        Self::Publish {
            destination: destination.into(),
            message: message.to_string(),
        }
    }

    pub fn consume(destination: impl Into<String>, message: impl ToString) -> Self {
        Self::Consume {
            destination: destination.into(),
            message: message.to_string(),
        }
    }
}
