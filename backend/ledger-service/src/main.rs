use anyhow::{Context, Result};
use idempotent_ledger::PgLedgerStore;
use ledger_service::kafka::{KafkaPartitionReader, KafkaStreamProducer};
use ledger_service::{telemetry, Config, ConsumptionEngine, DeadLetterRouter};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        brokers = %config.kafka.brokers,
        topic = %config.ledger.topic,
        dlq_topic = %config.ledger.dlq_topic,
        partitions = config.ledger.partition_count,
        "Starting ledger-service"
    );

    let database_url = config
        .database
        .url
        .as_deref()
        .context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("Failed to connect to ledger database")?;

    let store = PgLedgerStore::new(pool);
    store
        .migrate()
        .await
        .context("Failed to run ledger migrations")?;
    info!("Ledger database ready");

    let producer = KafkaStreamProducer::new(&config.kafka.brokers, config.publish_timeout())
        .context("Failed to create Kafka producer")?;
    if let Err(e) = producer.health_check(&config.ledger.dlq_topic, Duration::from_secs(5)) {
        warn!(error = %e, "Dead-letter topic metadata unavailable at startup");
    }
    let producer = Arc::new(producer);
    let dead_letters = Arc::new(DeadLetterRouter::new(
        producer.clone(),
        config.ledger.dlq_topic.as_str(),
    ));

    let brokers = config.kafka.brokers.clone();
    let group_id = config.kafka.group_id.clone();
    let topic = config.ledger.topic.clone();
    let engine = ConsumptionEngine::start(
        config.partitions(),
        |partition| KafkaPartitionReader::new(&brokers, &group_id, &topic, partition),
        Arc::new(store),
        dead_letters,
        &config.router(),
        config.worker_settings(),
    )
    .context("Failed to start consumption engine")?;

    info!(partitions = ?engine.partitions(), "Consuming transactions");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let report = engine.shutdown(config.shutdown_timeout()).await;
    if let Err(e) = producer.flush(config.publish_timeout()) {
        warn!(error = %e, "Producer flush incomplete at shutdown");
    }

    if !report.is_clean() {
        warn!(
            timed_out = ?report.timed_out,
            failed = ?report.failed,
            "Some partition workers did not stop cleanly"
        );
    }
    info!("ledger-service stopped");

    Ok(())
}
