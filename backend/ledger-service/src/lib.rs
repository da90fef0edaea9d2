//! Ledger Service
//!
//! Routes bank transaction events into a city-partitioned Kafka topic and
//! consumes each partition with a dedicated worker that validates, deduplicates
//! and records transactions in the idempotent ledger, diverting invalid events
//! to a dead-letter topic.

pub mod config;
pub mod consumer;
pub mod dlq;
pub mod error;
pub mod kafka;
pub mod models;
pub mod publisher;
pub mod routing;
pub mod telemetry;

// Public re-exports
pub use config::Config;
pub use consumer::{
    ConsumptionEngine, EngineReport, PartitionWorker, WorkerSettings, WorkerState, WorkerStats,
};
pub use dlq::DeadLetterRouter;
pub use error::{AppError, Result};
pub use publisher::{EventPublisher, PublishHandle, PublishOutcome};
pub use routing::PartitionRouter;
