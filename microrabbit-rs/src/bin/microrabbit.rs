//! CLI for microrabbit: publish a raw event payload or tail a destination.
//!
//! Connection settings come from `MICRORABBIT_*` environment variables.

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use microrabbit::{init_tracing, AmqpBroker, Broker, BrokerError, BusConfig, Delivery, LogFormat};
use tracing::{info, warn};

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "microrabbit")]
#[command(about = "MicroRabbit event bus CLI")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a JSON payload to a destination (the event name, e.g. OrderCreated).
    Publish {
        destination: String,
        /// Event body as JSON, e.g. '{"order_id":"42","timestamp":"2024-01-01T00:00:00Z"}'
        json: String,
    },
    /// Print every payload arriving at a destination until Ctrl-C.
    Tail {
        destination: String,
        /// Leave messages unacknowledged; they return to the queue when tail exits.
        /// At most the prefetch count is held at once.
        #[arg(long)]
        requeue: bool,
    },
}

async fn run_publish(broker: &AmqpBroker, destination: &str, json: &str) -> CliResult {
    let body: serde_json::Value = serde_json::from_str(json)?;
    let payload = serde_json::to_vec(&body)?;
    broker.publish(destination, &payload).await?;
    println!("published {} bytes to {}", payload.len(), destination);
    Ok(())
}

/// Ack a tailed delivery, or with `requeue` leave it pending. Requeueing while
/// still attached would hand the same message straight back to this consumer.
async fn settle(delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
    if requeue {
        return Ok(());
    }
    delivery.ack().await
}

async fn run_tail(broker: &AmqpBroker, destination: &str, requeue: bool) -> CliResult {
    let mut deliveries = broker.consume(destination).await?;
    info!(destination, "tailing, Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = deliveries.next() => match next {
                Some(Ok(delivery)) => {
                    match delivery.payload_str() {
                        Some(text) => println!("{text}"),
                        None => println!("<{} bytes, not utf-8>", delivery.payload.len()),
                    }
                    if let Err(e) = settle(&delivery, requeue).await {
                        warn!(destination, error = %e, "settling delivery failed");
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();
    init_tracing(if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty });

    let config = BusConfig::from_env()?;
    let broker = AmqpBroker::new(config.amqp());
    match cli.command {
        Commands::Publish { destination, json } => run_publish(&broker, &destination, &json).await,
        Commands::Tail { destination, requeue } => run_tail(&broker, &destination, requeue).await,
    }
}
