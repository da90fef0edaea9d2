use idempotent_ledger::{LedgerError, LedgerStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{WorkerSettings, WorkerState, WorkerStats};
use crate::dlq::DeadLetterRouter;
use crate::kafka::{PartitionReader, StreamRecord};
use crate::models::{validate_payload, RejectReason};
use crate::publisher::PublishOutcome;

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Persisted,
    Duplicate,
    DeadLettered,
    /// Not handled; must be read again before anything after it is committed
    Retry,
}

/// Sequential consumer of a single partition.
///
/// Per record: validate, check the ledger, save, commit. The cursor never moves
/// past a record until it is persisted, found already persisted, or dead-lettered.
/// A record whose ledger call fails is re-read after `retry_backoff`.
pub struct PartitionWorker<R: PartitionReader> {
    reader: R,
    store: Arc<dyn LedgerStore>,
    dead_letters: Arc<DeadLetterRouter>,
    city: String,
    settings: WorkerSettings,
    state: WorkerState,
    stats: WorkerStats,
    /// Offset to seek back to before the next poll
    pending_rewind: Option<i64>,
}

impl<R: PartitionReader> PartitionWorker<R> {
    pub fn new(
        reader: R,
        store: Arc<dyn LedgerStore>,
        dead_letters: Arc<DeadLetterRouter>,
        city: impl Into<String>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            reader,
            store,
            dead_letters,
            city: city.into(),
            settings,
            state: WorkerState::Starting,
            stats: WorkerStats::default(),
            pending_rewind: None,
        }
    }

    pub fn partition(&self) -> i32 {
        self.reader.partition()
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Consume until `shutdown` turns true (or its sender is dropped).
    ///
    /// The signal is observed between batches and during waits; a batch in
    /// progress is always finished first.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let partition = self.partition();
        info!(partition = partition, city = %self.city, "Partition worker starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Some(offset) = self.pending_rewind {
                match self.reader.rewind(offset).await {
                    Ok(()) => self.pending_rewind = None,
                    Err(e) => {
                        error!(
                            partition = partition,
                            offset = offset,
                            error = %e,
                            "Failed to rewind to unprocessed record"
                        );
                        if backoff(self.settings.retry_backoff, &mut shutdown).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            self.transition(WorkerState::Polling);
            let polled = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                polled = self.reader.poll(self.settings.poll_timeout, self.settings.max_batch_size) => polled,
            };

            let batch = match polled {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(partition = partition, error = %e, "Poll failed");
                    if backoff(self.settings.retry_backoff, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if batch.is_empty() {
                continue;
            }

            self.transition(WorkerState::Processing);
            self.stats.batches += 1;
            if let Some(offset) = self.process_batch(&batch).await {
                self.pending_rewind = Some(offset);
                if backoff(self.settings.retry_backoff, &mut shutdown).await {
                    break;
                }
            }
        }

        self.transition(WorkerState::Stopped);
        info!(
            partition = partition,
            city = %self.city,
            persisted = self.stats.persisted,
            duplicates = self.stats.duplicates,
            dead_lettered = self.stats.dead_lettered,
            persist_failures = self.stats.persist_failures,
            commit_failures = self.stats.commit_failures,
            "Partition worker stopped"
        );
        self.stats
    }

    /// Handle records in order. Returns the offset to re-read if a record
    /// could not be handled; the rest of the batch is abandoned.
    async fn process_batch(&mut self, batch: &[StreamRecord]) -> Option<i64> {
        for record in batch {
            let started = Instant::now();
            let transaction_id = record.key.as_deref().unwrap_or_default();
            info!(
                partition = record.partition,
                city = %self.city,
                offset = record.offset,
                transaction_id = %transaction_id,
                "Processing transaction"
            );

            let outcome = self.process_record(record).await;

            info!(
                partition = record.partition,
                city = %self.city,
                offset = record.offset,
                transaction_id = %transaction_id,
                outcome = ?outcome,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Finished transaction"
            );

            if outcome == RecordOutcome::Retry {
                return Some(record.offset);
            }
            self.commit(record).await;
        }
        None
    }

    async fn process_record(&mut self, record: &StreamRecord) -> RecordOutcome {
        let id = match record.key.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => {
                let payload = record.payload.as_deref().unwrap_or_default();
                return self
                    .dead_letter("", payload, RejectReason::MissingTransactionId, record)
                    .await;
            }
        };
        let payload = record.payload.as_deref().unwrap_or_default();

        if let Err(reason) = validate_payload(payload) {
            return self.dead_letter(id, payload, reason, record).await;
        }

        match self.store.exists(id).await {
            Ok(true) => {
                debug!(transaction_id = %id, "Transaction already recorded, skipping");
                self.stats.duplicates += 1;
                return RecordOutcome::Duplicate;
            }
            Ok(false) => {}
            Err(LedgerError::InvalidTransactionId(msg)) => {
                return self
                    .dead_letter(id, payload, RejectReason::InvalidTransactionId(msg), record)
                    .await;
            }
            Err(e) => {
                error!(
                    transaction_id = %id,
                    error = %e,
                    transient = e.is_transient(),
                    "Ledger lookup failed"
                );
                self.stats.persist_failures += 1;
                return RecordOutcome::Retry;
            }
        }

        match self.store.save(id, payload).await {
            Ok(()) => {
                self.stats.persisted += 1;
                RecordOutcome::Persisted
            }
            Err(e) => {
                // Not committed: the re-read either finds the record or inserts it
                error!(
                    transaction_id = %id,
                    error = %e,
                    duplicate = e.is_duplicate_key(),
                    transient = e.is_transient(),
                    "Failed to record transaction"
                );
                self.stats.persist_failures += 1;
                RecordOutcome::Retry
            }
        }
    }

    /// A failed dead-letter publish still counts as handled
    async fn dead_letter(
        &mut self,
        id: &str,
        payload: &str,
        reason: RejectReason,
        record: &StreamRecord,
    ) -> RecordOutcome {
        warn!(
            transaction_id = %id,
            partition = record.partition,
            offset = record.offset,
            reason = %reason,
            "Invalid transaction"
        );

        match self
            .dead_letters
            .reject(id, payload, &reason, Some(record))
            .await
        {
            PublishOutcome::Delivered { .. } => self.stats.dead_lettered += 1,
            PublishOutcome::Failed(_) => self.stats.dead_letter_failures += 1,
        }
        RecordOutcome::DeadLettered
    }

    async fn commit(&mut self, record: &StreamRecord) {
        if let Err(e) = self.reader.commit(record).await {
            warn!(
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Offset commit failed, record may be redelivered"
            );
            self.stats.commit_failures += 1;
        }
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            debug!(
                partition = self.reader.partition(),
                from = ?self.state,
                to = ?next,
                "Worker state change"
            );
            self.state = next;
        }
    }
}

/// Sleep for `delay` unless shutdown is requested first. Returns true on shutdown.
async fn backoff(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
