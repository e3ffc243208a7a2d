//! Outbound events: serialize and hand to the broker under the event's name.

use std::sync::Arc;

use microrabbit_core::Broker;
use tracing::debug;

use crate::core::BusError;
use crate::domain::Event;

#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn Broker>,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Publish `event` to the destination named after its type.
    ///
    /// The broker declares the destination and transmits over a channel scoped
    /// to this call. Broker errors are returned as-is; there is no retry.
    pub async fn publish<E: Event>(&self, event: &E) -> Result<(), BusError> {
        let destination = E::name();
        let payload = serde_json::to_vec(event).map_err(|source| BusError::Serialization {
            event: destination.to_owned(),
            source,
        })?;
        self.broker.publish(destination, &payload).await?;
        debug!(
            event = destination,
            bytes = payload.len(),
            broker = self.broker.provider_name(),
            "event published"
        );
        Ok(())
    }
}
