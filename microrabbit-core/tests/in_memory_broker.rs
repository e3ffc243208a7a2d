//! In-memory broker: publish, consume, acknowledge, redeliver.

use std::time::Duration;

use futures_util::StreamExt;
use microrabbit_core::{Broker, DeliveryStream, InMemoryBroker, QueueStats};

async fn next_payload(deliveries: &mut DeliveryStream) -> microrabbit_core::Delivery {
    tokio::time::timeout(Duration::from_secs(1), deliveries.next())
        .await
        .expect("delivery within a second")
        .expect("stream open")
        .expect("delivery ok")
}

#[tokio::test]
async fn publish_then_consume_in_order() {
    let broker = InMemoryBroker::new();
    broker.publish("OrderCreated", br#"{"order_id":"1"}"#).await.unwrap();
    broker.publish("OrderCreated", br#"{"order_id":"2"}"#).await.unwrap();

    let mut deliveries = broker.consume("OrderCreated").await.unwrap();
    let first = next_payload(&mut deliveries).await;
    let second = next_payload(&mut deliveries).await;

    assert_eq!(first.payload_str(), Some(r#"{"order_id":"1"}"#));
    assert_eq!(second.payload_str(), Some(r#"{"order_id":"2"}"#));
    assert_eq!(first.destination, "OrderCreated");
    assert!(!first.redelivered);
    assert_ne!(first.delivery_tag, second.delivery_tag);
}

#[tokio::test]
async fn destinations_are_independent() {
    let broker = InMemoryBroker::new();
    broker.publish("A", b"a").await.unwrap();
    broker.publish("B", b"b").await.unwrap();

    let mut b = broker.consume("B").await.unwrap();
    assert_eq!(next_payload(&mut b).await.payload, b"b");
    assert_eq!(broker.stats("A").unwrap().pending, 1);
    assert_eq!(broker.destinations(), vec!["A".to_string(), "B".to_string()]);
}

#[tokio::test]
async fn ack_is_counted() {
    let broker = InMemoryBroker::new();
    let mut deliveries = broker.consume("Q").await.unwrap();
    broker.publish("Q", b"{}").await.unwrap();

    next_payload(&mut deliveries).await.ack().await.unwrap();

    assert_eq!(
        broker.stats("Q").unwrap(),
        QueueStats {
            published: 1,
            delivered: 1,
            acked: 1,
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn nack_with_requeue_redelivers() {
    let broker = InMemoryBroker::new();
    let mut deliveries = broker.consume("Q").await.unwrap();
    broker.publish("Q", b"retry me").await.unwrap();

    let first = next_payload(&mut deliveries).await;
    first.nack(true).await.unwrap();

    let again = next_payload(&mut deliveries).await;
    assert!(again.redelivered);
    assert_eq!(again.payload, b"retry me");
    assert!(broker.dead_letters("Q").is_empty());
}

#[tokio::test]
async fn nack_without_requeue_dead_letters() {
    let broker = InMemoryBroker::new();
    let mut deliveries = broker.consume("Q").await.unwrap();
    broker.publish("Q", b"poison").await.unwrap();

    next_payload(&mut deliveries).await.nack(false).await.unwrap();

    assert_eq!(broker.dead_letters("Q"), vec![b"poison".to_vec()]);
    let stats = broker.stats("Q").unwrap();
    assert_eq!(stats.nacked, 1);
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn competing_consumers_share_a_destination() {
    let broker = InMemoryBroker::new();
    let mut one = broker.consume("Q").await.unwrap();
    let mut two = broker.consume("Q").await.unwrap();
    broker.publish("Q", b"1").await.unwrap();
    broker.publish("Q", b"2").await.unwrap();

    let a = next_payload(&mut one).await;
    let b = next_payload(&mut two).await;
    let mut seen = vec![a.payload, b.payload];
    seen.sort();
    assert_eq!(seen, vec![b"1".to_vec(), b"2".to_vec()]);
}

#[tokio::test]
async fn close_ends_streams_after_draining() {
    let broker = InMemoryBroker::new();
    let mut deliveries = broker.consume("Q").await.unwrap();
    broker.publish("Q", b"last").await.unwrap();
    broker.close();

    assert_eq!(next_payload(&mut deliveries).await.payload, b"last");
    let end = tokio::time::timeout(Duration::from_secs(1), deliveries.next())
        .await
        .unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn published_log_keeps_payloads() {
    let broker = InMemoryBroker::new();
    broker.publish("Q", b"x").await.unwrap();
    broker.publish("Q", b"y").await.unwrap();
    assert_eq!(broker.published("Q"), vec![b"x".to_vec(), b"y".to_vec()]);
    assert!(broker.published("Missing").is_empty());
    assert_eq!(broker.provider_name(), "in-memory");
}
