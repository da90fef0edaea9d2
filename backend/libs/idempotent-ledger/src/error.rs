//! Error types for the idempotent ledger library

use thiserror::Error;

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur while reading or writing ledger records
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Database operation failed (connection, query execution, etc.)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed at startup
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A record with this transaction ID already exists; the insert was refused
    #[error("Transaction already recorded: {0}")]
    DuplicateTransaction(String),

    /// Transaction ID validation failed (empty, too long)
    #[error("Invalid transaction ID: {0}")]
    InvalidTransactionId(String),

    /// Store refused the operation (used by the in-memory store for fault injection)
    #[error("Ledger store unavailable: {0}")]
    Unavailable(String),

    /// Generic error with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    /// Check if error is a duplicate key violation (transaction already recorded)
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            LedgerError::DuplicateTransaction(_) => true,
            LedgerError::Database(sqlx_err) => {
                // PostgreSQL unique violation error code: 23505
                if let Some(db_err) = sqlx_err.as_database_error() {
                    db_err.code().as_deref() == Some("23505")
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Check if error is transient (a later redelivery may succeed)
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Database(sqlx_err) => matches!(
                sqlx_err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            LedgerError::Unavailable(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_classification() {
        assert!(LedgerError::DuplicateTransaction("T1".to_string()).is_duplicate_key());
        assert!(!LedgerError::Unavailable("down".to_string()).is_duplicate_key());
        assert!(!LedgerError::Database(sqlx::Error::RowNotFound).is_duplicate_key());
    }

    #[test]
    fn test_transient_classification() {
        assert!(LedgerError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(LedgerError::Unavailable("down".to_string()).is_transient());
        assert!(!LedgerError::InvalidTransactionId("".to_string()).is_transient());
        assert!(!LedgerError::DuplicateTransaction("T1".to_string()).is_transient());
    }
}
