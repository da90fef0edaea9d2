//! In-process ledger store for tests and local runs

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::{validate_transaction_id, LedgerError, LedgerRecord, LedgerResult, LedgerStore};

#[derive(Default)]
struct Ledger {
    records: HashMap<String, LedgerRecord>,
    insertion_order: Vec<String>,
}

/// `LedgerStore` backed by a mutex-guarded map.
///
/// The existence check and the insert run under the same lock, so concurrent
/// saves of one ID resolve to exactly one success.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    ledger: Mutex<Ledger>,
    failing_saves: AtomicUsize,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `save` fail with `LedgerError::Unavailable`
    /// without writing anything.
    pub fn fail_next_saves(&self, n: usize) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    /// Transaction IDs in the order they were recorded
    pub fn recorded_ids(&self) -> Vec<String> {
        self.lock().insertion_order.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn exists(&self, transaction_id: &str) -> LedgerResult<bool> {
        validate_transaction_id(transaction_id)?;
        Ok(self.lock().records.contains_key(transaction_id))
    }

    async fn save(&self, transaction_id: &str, payload: &str) -> LedgerResult<()> {
        validate_transaction_id(transaction_id)?;

        if self.take_injected_failure() {
            warn!(transaction_id = %transaction_id, "Injected ledger save failure");
            return Err(LedgerError::Unavailable(format!(
                "save of {} rejected",
                transaction_id
            )));
        }

        let mut ledger = self.lock();
        if ledger.records.contains_key(transaction_id) {
            debug!(transaction_id = %transaction_id, "Refused duplicate ledger insert");
            return Err(LedgerError::DuplicateTransaction(transaction_id.to_string()));
        }

        ledger.records.insert(
            transaction_id.to_string(),
            LedgerRecord {
                transaction_id: transaction_id.to_string(),
                payload: payload.to_string(),
                recorded_at: Utc::now(),
            },
        );
        ledger.insertion_order.push(transaction_id.to_string());

        info!(transaction_id = %transaction_id, "Transaction recorded in ledger");
        Ok(())
    }

    async fn get(&self, transaction_id: &str) -> LedgerResult<Option<LedgerRecord>> {
        validate_transaction_id(transaction_id)?;
        Ok(self.lock().records.get(transaction_id).cloned())
    }

    async fn count(&self) -> LedgerResult<i64> {
        Ok(self.lock().records.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_save_then_exists() {
        let store = InMemoryLedgerStore::new();
        assert!(!store.exists("T1").await.unwrap());

        store.save("T1", r#"{"amount":200}"#).await.unwrap();

        assert!(store.exists("T1").await.unwrap());
        let record = store.get("T1").await.unwrap().unwrap();
        assert_eq!(record.payload, r#"{"amount":200}"#);
    }

    #[tokio::test]
    async fn test_duplicate_save_is_refused_without_overwrite() {
        let store = InMemoryLedgerStore::new();
        store.save("T1", "first").await.unwrap();

        let err = store.save("T1", "second").await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateTransaction(ref id) if id == "T1"));

        assert_eq!(store.get("T1").await.unwrap().unwrap().payload, "first");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = InMemoryLedgerStore::new();
        store.fail_next_saves(2);

        assert!(matches!(
            store.save("T1", "p").await,
            Err(LedgerError::Unavailable(_))
        ));
        assert_err!(store.save("T1", "p").await);
        assert!(!store.exists("T1").await.unwrap());

        assert_ok!(store.save("T1", "p").await);
        assert_eq!(store.recorded_ids(), vec!["T1".to_string()]);
    }

    #[tokio::test]
    async fn test_multibyte_id_within_limit_is_accepted() {
        let store = InMemoryLedgerStore::new();
        let id = "é".repeat(200);

        assert!(!assert_ok!(store.exists(&id).await));
        assert_ok!(store.save(&id, "p").await);
        assert!(assert_ok!(store.exists(&id).await));
    }
}
