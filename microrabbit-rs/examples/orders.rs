//! Example: OrderCreated fanned out to two handlers on the in-memory broker.
//! The inventory handler reserves stock through a command sent back through the bus.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use microrabbit::{
    init_tracing, now, Command, CommandHandler, Event, EventBus, EventHandler, HandlerError,
    InMemoryBroker, InProcessMediator, LogFormat, Timestamp,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Clone, Debug, Serialize, Deserialize, Event)]
struct OrderCreated {
    order_id: String,
    quantity: u32,
    timestamp: Timestamp,
}

#[derive(Debug, Command)]
#[message(reply = "u32")]
struct ReserveStock {
    order_id: String,
    quantity: u32,
    timestamp: Timestamp,
}

struct StockKeeper;

#[async_trait]
impl CommandHandler<ReserveStock> for StockKeeper {
    async fn handle(&self, command: ReserveStock) -> Result<u32, HandlerError> {
        println!("stock: reserved {} for order {}", command.quantity, command.order_id);
        Ok(command.quantity)
    }
}

#[derive(Default)]
struct EmailHandler;

#[async_trait]
impl EventHandler<OrderCreated> for EmailHandler {
    async fn handle(&self, event: &OrderCreated) -> Result<(), HandlerError> {
        println!("email: confirmation sent for order {}", event.order_id);
        Ok(())
    }
}

struct InventoryHandler {
    bus: Arc<EventBus>,
    done: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl EventHandler<OrderCreated> for InventoryHandler {
    async fn handle(&self, event: &OrderCreated) -> Result<(), HandlerError> {
        let reserved = self
            .bus
            .send_command(ReserveStock {
                order_id: event.order_id.clone(),
                quantity: event.quantity,
                timestamp: now(),
            })
            .await?;
        println!("inventory: order {} holds {} units", event.order_id, reserved);
        self.done.send(event.order_id.clone())?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing(LogFormat::Pretty);

    let broker = Arc::new(InMemoryBroker::new());
    let mediator = InProcessMediator::new().with_handler::<ReserveStock, _>(StockKeeper);
    let bus = Arc::new(EventBus::new(broker.clone(), mediator));

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    bus.subscribe::<OrderCreated, EmailHandler>().await?;
    let handler_bus = Arc::clone(&bus);
    bus.subscribe_with::<OrderCreated, InventoryHandler, _>(move || InventoryHandler {
        bus: Arc::clone(&handler_bus),
        done: done_tx.clone(),
    })
    .await?;

    bus.publish(&OrderCreated {
        order_id: "42".into(),
        quantity: 3,
        timestamp: now(),
    })
    .await?;

    let order_id = tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
        .await?
        .ok_or("inventory handler went away")?;
    println!("order {order_id} processed");
    if let Some(stats) = broker.stats("OrderCreated") {
        println!("OrderCreated queue: {stats:?}");
    }

    bus.shutdown().await?;
    Ok(())
}
