//! Bulk submission of transactions to the partitioned topic.
//!
//! Input is a JSON object mapping transaction ids to payloads, e.g.
//! `{"1001": {"client": "Alice", "city": "Montréal", "amount": 200, "type": "DEPOSIT"}}`.
//! Payload values may be objects or pre-serialized strings. Entries are
//! submitted in id order.

use anyhow::{Context, Result};
use ledger_service::kafka::KafkaStreamProducer;
use ledger_service::{telemetry, Config, EventPublisher, PublishOutcome};
use serde_json::{Map, Value};
use std::env;
use std::io::Read;
use std::sync::Arc;
use tracing::info;

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  submit-transactions <file.json>");
    eprintln!("  submit-transactions -        (read from stdin)");
    std::process::exit(1);
}

fn read_input(source: &str) -> Result<String> {
    if source == "-" {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read stdin")?;
        Ok(input)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))
    }
}

fn parse_transactions(input: &str) -> Result<Vec<(String, String)>> {
    let entries: Map<String, Value> =
        serde_json::from_str(input).context("Input must be a JSON object of id -> payload")?;

    let mut transactions: Vec<(String, String)> = entries
        .into_iter()
        .map(|(id, payload)| match payload {
            Value::String(raw) => (id, raw),
            other => (id, other.to_string()),
        })
        .collect();
    transactions.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(transactions)
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        usage();
    }

    let transactions = parse_transactions(&read_input(&args[1])?)?;
    let config = Config::from_env().context("Failed to load configuration")?;

    let producer = Arc::new(
        KafkaStreamProducer::new(&config.kafka.brokers, config.publish_timeout())
            .context("Failed to create Kafka producer")?,
    );
    let publisher = EventPublisher::new(
        producer.clone(),
        config.router(),
        config.ledger.topic.as_str(),
    );

    info!(
        count = transactions.len(),
        topic = %publisher.topic(),
        "Submitting transactions"
    );

    let mut delivered = 0usize;
    let mut failed = 0usize;
    for handle in publisher.submit_all(transactions) {
        match handle.await {
            Ok(PublishOutcome::Delivered { .. }) => delivered += 1,
            Ok(PublishOutcome::Failed(_)) | Err(_) => failed += 1,
        }
    }

    producer
        .flush(config.publish_timeout())
        .context("Failed to flush producer")?;

    println!("Submitted {} transactions, {} failed", delivered, failed);
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
