//! # Idempotent Ledger Store
//!
//! Durable record of processed financial transactions, keyed by transaction ID.
//! Consumers use it to turn at-least-once Kafka delivery into exactly-once
//! ledger effects: a redelivered transaction finds its record already present
//! and is skipped.
//!
//! ## Contract
//!
//! - `exists(id)` reflects every `save` that previously returned `Ok`
//! - `save(id, payload)` inserts exactly once; a second insert for the same ID
//!   fails with [`LedgerError::DuplicateTransaction`] instead of overwriting
//! - records are never updated or deleted
//!
//! ## Architecture
//!
//! ```text
//! Kafka partition N → Partition worker N ──exists?──┐
//!                                        └──save────┤
//!                                                   ↓
//!                                             PostgreSQL
//!                                       (ledger_transactions table)
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use idempotent_ledger::{LedgerStore, PgLedgerStore};
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let store = PgLedgerStore::new(pool);
//! store.migrate().await?;
//!
//! if !store.exists("1001").await? {
//!     store.save("1001", r#"{"city":"Toronto","amount":50}"#).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Safety
//!
//! Both implementations are safe to share across partition workers behind an
//! `Arc<dyn LedgerStore>`. When two writers race on the same ID, the primary
//! key (PostgreSQL) or the write lock (in-memory) lets exactly one insert win;
//! the loser receives `DuplicateTransaction`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};

mod error;
mod memory;

pub use error::{LedgerError, LedgerResult};
pub use memory::InMemoryLedgerStore;

/// Maximum accepted transaction ID length (matches the column width)
pub const MAX_TRANSACTION_ID_LEN: usize = 255;

/// A persisted ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Unique transaction identifier (primary key)
    pub transaction_id: String,

    /// Raw event body exactly as received from the stream
    pub payload: String,

    /// Timestamp when the record was written
    pub recorded_at: DateTime<Utc>,
}

/// Persistence seam used by the consumption engine.
///
/// Implementations must be safe for concurrent use from all partition workers.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Check whether a record exists for `transaction_id`.
    async fn exists(&self, transaction_id: &str) -> LedgerResult<bool>;

    /// Insert a new record. Never overwrites: an existing ID yields
    /// [`LedgerError::DuplicateTransaction`].
    async fn save(&self, transaction_id: &str, payload: &str) -> LedgerResult<()>;

    /// Fetch a record by ID.
    async fn get(&self, transaction_id: &str) -> LedgerResult<Option<LedgerRecord>>;

    /// Total number of records.
    async fn count(&self) -> LedgerResult<i64>;
}

/// Validate transaction ID format
pub fn validate_transaction_id(transaction_id: &str) -> LedgerResult<()> {
    if transaction_id.is_empty() {
        return Err(LedgerError::InvalidTransactionId(
            "Transaction ID cannot be empty".to_string(),
        ));
    }

    // VARCHAR(n) limits characters, not bytes
    let length = transaction_id.chars().count();
    if length > MAX_TRANSACTION_ID_LEN {
        return Err(LedgerError::InvalidTransactionId(format!(
            "Transaction ID too long: {} characters (max {})",
            length, MAX_TRANSACTION_ID_LEN
        )));
    }

    Ok(())
}

/// PostgreSQL-backed ledger store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new store over an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled migrations (creates `ledger_transactions`)
    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Ledger migrations applied");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn exists(&self, transaction_id: &str) -> LedgerResult<bool> {
        validate_transaction_id(transaction_id)?;

        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM ledger_transactions WHERE transaction_id = $1
            ) AS exists
            "#,
        )
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await?;

        let exists: bool = row.try_get("exists")?;

        if exists {
            debug!(transaction_id = %transaction_id, "Transaction already recorded");
        }

        Ok(exists)
    }

    async fn save(&self, transaction_id: &str, payload: &str) -> LedgerResult<()> {
        validate_transaction_id(transaction_id)?;

        // Plain INSERT: the primary key turns a concurrent or mis-routed
        // duplicate into an error rather than a silent overwrite.
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_transactions (transaction_id, payload, recorded_at)
            VALUES ($1, $2, NOW())
            "#,
        )
        .bind(transaction_id)
        .bind(payload)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!(transaction_id = %transaction_id, "Transaction recorded in ledger");
                Ok(())
            }
            Err(e) => {
                let err = LedgerError::from(e);
                if err.is_duplicate_key() {
                    warn!(
                        transaction_id = %transaction_id,
                        "Refused duplicate ledger insert"
                    );
                    return Err(LedgerError::DuplicateTransaction(transaction_id.to_string()));
                }
                Err(err)
            }
        }
    }

    async fn get(&self, transaction_id: &str) -> LedgerResult<Option<LedgerRecord>> {
        validate_transaction_id(transaction_id)?;

        let row = sqlx::query(
            r#"
            SELECT transaction_id, payload, recorded_at
            FROM ledger_transactions
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> LedgerResult<LedgerRecord> {
            Ok(LedgerRecord {
                transaction_id: row.try_get("transaction_id")?,
                payload: row.try_get("payload")?,
                recorded_at: row.try_get("recorded_at")?,
            })
        })
        .transpose()
    }

    async fn count(&self) -> LedgerResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ledger_transactions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
