//! Error types for the ledger service

use idempotent_ledger::LedgerError;
use rdkafka::error::KafkaError;
use thiserror::Error;

/// Result type for ledger-service operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Broker client failure (producer, consumer, commit, seek)
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// Ledger store failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Record could not be handed to the transport
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Offset commit refused by the transport
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Environment variable could not be deserialized
    #[error("Environment error: {0}")]
    Env(#[from] envy::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
