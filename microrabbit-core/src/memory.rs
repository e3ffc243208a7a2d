//! In-process broker for tests and single-process deployments.
//!
//! One FIFO queue per destination. Consumers of the same destination compete
//! for messages; a nack with requeue puts the message back at the tail marked
//! as redelivered, a nack without requeue moves it to the dead-letter list.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::broker::{Acknowledger, Broker, Delivery, DeliveryStream};
use crate::BrokerError;

/// Counters for one destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub published: u64,
    pub delivered: u64,
    pub acked: u64,
    pub nacked: u64,
    pub dead_lettered: u64,
    /// Messages waiting to be delivered.
    pub pending: u64,
}

struct Stored {
    payload: Vec<u8>,
    redelivered: bool,
}

struct Queue {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Stored>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Stored>>,
    published_log: Mutex<Vec<Vec<u8>>>,
    dead_letters: Mutex<Vec<Vec<u8>>>,
    next_tag: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
    pending: AtomicU64,
}

impl Queue {
    fn new(name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_owned(),
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            published_log: Mutex::new(Vec::new()),
            dead_letters: Mutex::new(Vec::new()),
            next_tag: AtomicU64::new(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            nacked: AtomicU64::new(0),
            pending: AtomicU64::new(0),
        }
    }

    fn enqueue(&self, stored: Stored) -> Result<(), BrokerError> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(BrokerError::Closed)?;
        self.pending.fetch_add(1, Ordering::Relaxed);
        tx.send(stored).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            BrokerError::Closed
        })
    }

    async fn receive(&self) -> Option<Stored> {
        let stored = self.rx.lock().await.recv().await?;
        self.pending.fetch_sub(1, Ordering::Relaxed);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Some(stored)
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
            dead_lettered: self.dead_letters.lock().len() as u64,
            pending: self.pending.load(Ordering::Relaxed),
        }
    }
}

struct MemoryAcker {
    queue: Arc<Queue>,
    delivery_tag: u64,
    payload: Vec<u8>,
    settled: AtomicBool,
}

impl MemoryAcker {
    fn settle(&self) -> Result<(), BrokerError> {
        if self.settled.swap(true, Ordering::AcqRel) {
            return Err(BrokerError::Acknowledge {
                destination: self.queue.name.clone(),
                delivery_tag: self.delivery_tag,
                message: "delivery already settled".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.settle()?;
        self.queue.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.settle()?;
        self.queue.nacked.fetch_add(1, Ordering::Relaxed);
        if requeue {
            let requeued = self.queue.enqueue(Stored {
                payload: self.payload.clone(),
                redelivered: true,
            });
            if requeued.is_err() {
                // Queue closed; the payload goes to the dead letters.
                self.queue.dead_letters.lock().push(self.payload.clone());
            }
            requeued
        } else {
            self.queue.dead_letters.lock().push(self.payload.clone());
            Ok(())
        }
    }
}

/// In-memory broker. Cheap to clone; clones share the same queues.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    queues: Arc<Mutex<HashMap<String, Arc<Queue>>>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, destination: &str) -> Result<Arc<Queue>, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        let mut queues = self.queues.lock();
        Ok(Arc::clone(
            queues
                .entry(destination.to_owned())
                .or_insert_with(|| Arc::new(Queue::new(destination))),
        ))
    }

    fn existing(&self, destination: &str) -> Option<Arc<Queue>> {
        self.queues.lock().get(destination).cloned()
    }

    /// Names of all declared destinations, sorted.
    pub fn destinations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Counters for a destination, `None` if it was never declared.
    pub fn stats(&self, destination: &str) -> Option<QueueStats> {
        self.existing(destination).map(|q| q.stats())
    }

    /// Every payload ever published to `destination`, in publish order.
    pub fn published(&self, destination: &str) -> Vec<Vec<u8>> {
        self.existing(destination)
            .map(|q| q.published_log.lock().clone())
            .unwrap_or_default()
    }

    /// Payloads rejected without requeue.
    pub fn dead_letters(&self, destination: &str) -> Vec<Vec<u8>> {
        self.existing(destination)
            .map(|q| q.dead_letters.lock().clone())
            .unwrap_or_default()
    }

    /// Stop accepting messages. Consumers drain what is queued, then their streams end.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for queue in self.queues.lock().values() {
            queue.tx.lock().take();
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare(&self, destination: &str) -> Result<(), BrokerError> {
        self.queue(destination).map(|_| ())
    }

    async fn publish(&self, destination: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let queue = self.queue(destination)?;
        queue.enqueue(Stored {
            payload: payload.to_vec(),
            redelivered: false,
        })?;
        queue.published.fetch_add(1, Ordering::Relaxed);
        queue.published_log.lock().push(payload.to_vec());
        trace!(destination, bytes = payload.len(), "in-memory publish");
        Ok(())
    }

    async fn consume(&self, destination: &str) -> Result<DeliveryStream, BrokerError> {
        let queue = self.queue(destination)?;
        debug!(destination, "in-memory consumer started");
        let deliveries = stream::unfold(queue, |queue| async move {
            let stored = queue.receive().await?;
            let delivery_tag = queue.next_tag.fetch_add(1, Ordering::Relaxed);
            let acker = MemoryAcker {
                queue: Arc::clone(&queue),
                delivery_tag,
                payload: stored.payload.clone(),
                settled: AtomicBool::new(false),
            };
            let delivery = Delivery::new(
                queue.name.clone(),
                stored.payload,
                delivery_tag,
                stored.redelivered,
                Box::new(acker),
            );
            Some((Ok(delivery), queue))
        });
        Ok(deliveries.boxed())
    }

    fn provider_name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn declare_is_idempotent() {
        let broker = InMemoryBroker::new();
        broker.declare("OrderCreated").await.unwrap();
        broker.declare("OrderCreated").await.unwrap();
        assert_eq!(broker.destinations(), vec!["OrderCreated".to_string()]);
        assert_eq!(broker.stats("OrderCreated"), Some(QueueStats::default()));
    }

    #[tokio::test]
    async fn double_settle_is_rejected() {
        let broker = InMemoryBroker::new();
        let mut deliveries = broker.consume("Q").await.unwrap();
        broker.publish("Q", b"{}").await.unwrap();
        let delivery = deliveries.next().await.unwrap().unwrap();
        delivery.ack().await.unwrap();
        let err = delivery.nack(true).await.unwrap_err();
        assert!(matches!(err, BrokerError::Acknowledge { .. }));
        assert_eq!(broker.stats("Q").unwrap().acked, 1);
        assert_eq!(broker.stats("Q").unwrap().nacked, 0);
    }

    #[tokio::test]
    async fn publish_after_close_fails() {
        let broker = InMemoryBroker::new();
        broker.declare("Q").await.unwrap();
        broker.close();
        let err = broker.publish("Q", b"{}").await.unwrap_err();
        assert!(matches!(err, BrokerError::Closed));
    }

    #[tokio::test]
    async fn requeue_after_close_dead_letters() {
        let broker = InMemoryBroker::new();
        let mut deliveries = broker.consume("Q").await.unwrap();
        broker.publish("Q", b"late").await.unwrap();
        let delivery = deliveries.next().await.unwrap().unwrap();

        broker.close();
        let err = delivery.nack(true).await.unwrap_err();
        assert!(matches!(err, BrokerError::Closed));
        assert_eq!(broker.dead_letters("Q"), vec![b"late".to_vec()]);
        assert_eq!(broker.stats("Q").unwrap().pending, 0);
    }
}
