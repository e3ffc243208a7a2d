//! Consumer loops: one task per subscribed event kind, draining its destination.
//!
//! A loop handles one delivery at a time, so messages of one event kind are
//! dispatched to completion in arrival order; loops for different kinds run
//! concurrently. The shutdown signal is checked between deliveries.
//!
//! Failure policy:
//! - payload that does not decode: warn, nack without requeue, continue
//! - handler failure: error, nack with `requeue_on_failure`, continue
//! - unresolved event type: error, nack with requeue, stop the loop
//! - broker stream error: stop the loop; stream end: stop cleanly

use futures_util::StreamExt;
use microrabbit_core::{Delivery, DeliveryStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dispatcher::Dispatcher;
use super::registry::EventKind;
use crate::core::{AckMode, BusConfig, BusError};

/// How deliveries are settled with the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub ack_mode: AckMode,
    pub requeue_on_failure: bool,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::from(&BusConfig::default())
    }
}

impl From<&BusConfig> for DeliveryPolicy {
    fn from(config: &BusConfig) -> Self {
        Self {
            ack_mode: config.ack_mode,
            requeue_on_failure: config.requeue_on_failure,
        }
    }
}

pub(crate) struct ConsumerHandle {
    event: EventKind,
    task: JoinHandle<Result<(), BusError>>,
}

impl ConsumerHandle {
    pub(crate) fn spawn(
        event: EventKind,
        deliveries: DeliveryStream,
        dispatcher: Dispatcher,
        policy: DeliveryPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let task = tokio::spawn(run(event, deliveries, dispatcher, policy, shutdown));
        Self { event, task }
    }

    pub(crate) fn event(&self) -> EventKind {
        self.event
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to end and return how it ended.
    pub(crate) async fn join(self) -> Result<(), BusError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(BusError::Consumer {
                event: self.event.name.to_owned(),
                message: e.to_string(),
            }),
        }
    }
}

async fn run(
    event: EventKind,
    mut deliveries: DeliveryStream,
    dispatcher: Dispatcher,
    policy: DeliveryPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BusError> {
    info!(event = event.name, ack_mode = ?policy.ack_mode, "consumer loop started");
    loop {
        if *shutdown.borrow_and_update() {
            info!(event = event.name, "consumer loop stopping on shutdown");
            return Ok(());
        }
        let next = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    info!(event = event.name, "shutdown signal dropped, consumer loop stopping");
                    return Ok(());
                }
                continue;
            }
            next = deliveries.next() => next,
        };
        match next {
            Some(Ok(delivery)) => handle_delivery(&delivery, &dispatcher, policy).await?,
            Some(Err(e)) => {
                error!(event = event.name, error = %e, "delivery stream failed, consumer loop stopping");
                return Err(e.into());
            }
            None => {
                info!(event = event.name, "delivery stream ended");
                return Ok(());
            }
        }
    }
}

async fn handle_delivery(
    delivery: &Delivery,
    dispatcher: &Dispatcher,
    policy: DeliveryPolicy,
) -> Result<(), BusError> {
    let name = delivery.destination.as_str();
    let tag = delivery.delivery_tag;
    let ack_after = policy.ack_mode == AckMode::AfterSuccess;

    if !ack_after {
        settle(delivery, Settle::Ack).await;
    }

    match dispatcher.process_event(name, &delivery.payload).await {
        Ok(outcome) => {
            debug!(event = name, delivery_tag = tag, ?outcome, "delivery processed");
            if ack_after {
                settle(delivery, Settle::Ack).await;
            }
            Ok(())
        }
        Err(e) if e.is_fatal() => {
            error!(event = name, delivery_tag = tag, error = %e, "registry inconsistency, consumer loop stopping");
            if ack_after {
                settle(delivery, Settle::Nack { requeue: true }).await;
            }
            Err(e)
        }
        Err(e @ BusError::Deserialization { .. }) => {
            warn!(event = name, delivery_tag = tag, error = %e, "dropping undecodable message");
            if ack_after {
                settle(delivery, Settle::Nack { requeue: false }).await;
            }
            Ok(())
        }
        Err(e) => {
            error!(
                event = name,
                delivery_tag = tag,
                redelivered = delivery.redelivered,
                requeue = policy.requeue_on_failure,
                error = %e,
                "event handling failed"
            );
            if ack_after {
                settle(
                    delivery,
                    Settle::Nack {
                        requeue: policy.requeue_on_failure,
                    },
                )
                .await;
            }
            Ok(())
        }
    }
}

enum Settle {
    Ack,
    Nack { requeue: bool },
}

async fn settle(delivery: &Delivery, how: Settle) {
    let result = match how {
        Settle::Ack => delivery.ack().await,
        Settle::Nack { requeue } => delivery.nack(requeue).await,
    };
    if let Err(e) = result {
        warn!(
            event = %delivery.destination,
            delivery_tag = delivery.delivery_tag,
            error = %e,
            "settling delivery failed"
        );
    }
}
