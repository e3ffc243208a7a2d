//! Broker boundary: destinations, raw payloads, deliveries with explicit acknowledgement.

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::BrokerError;

/// Stream of deliveries from one destination. Ends when the broker side closes.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

/// Message broker as seen by the bus: one named destination per event kind.
///
/// Implementations: [`crate::InMemoryBroker`] (tests, single process) and
/// [`crate::AmqpBroker`] (RabbitMQ).
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Create the destination if it does not exist. Safe to call repeatedly.
    async fn declare(&self, destination: &str) -> Result<(), BrokerError>;

    /// Declare `destination` and transmit `payload` to it over a channel scoped to this call.
    async fn publish(&self, destination: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Declare `destination` and start push delivery from it.
    ///
    /// Deliveries are not acknowledged until [`Delivery::ack`] or [`Delivery::nack`] is called.
    async fn consume(&self, destination: &str) -> Result<DeliveryStream, BrokerError>;

    /// Short provider name for logs ("in-memory", "amqp").
    fn provider_name(&self) -> &'static str;
}

/// Settles one delivery with the broker that produced it.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;
    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// A raw message received from a destination.
pub struct Delivery {
    pub destination: String,
    pub payload: Vec<u8>,
    pub delivery_tag: u64,
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        destination: impl Into<String>,
        payload: Vec<u8>,
        delivery_tag: u64,
        redelivered: bool,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            destination: destination.into(),
            payload,
            delivery_tag,
            redelivered,
            acker,
        }
    }

    /// Payload as text, when it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Confirm the delivery; the broker forgets it.
    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    /// Reject the delivery. `requeue = true` asks for redelivery, `false` dead-letters or drops it.
    pub async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("destination", &self.destination)
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
