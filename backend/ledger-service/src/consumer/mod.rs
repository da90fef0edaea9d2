//! Partition Consumption Engine
//!
//! One [`PartitionWorker`] per partition, each owning its own reader. Workers
//! share nothing but the ledger store and the dead-letter router; the
//! [`ConsumptionEngine`] spawns them and stops them cooperatively.

mod engine;
mod worker;

pub use engine::{ConsumptionEngine, EngineReport};
pub use worker::PartitionWorker;

use std::time::Duration;

/// Worker lifecycle: `Starting → Polling → Processing → Polling …`, `Stopped` on shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Polling,
    Processing,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Bounded wait for one poll
    pub poll_timeout: Duration,
    pub max_batch_size: usize,
    /// Pause before re-reading a record whose persistence failed
    pub retry_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            max_batch_size: 500,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Counters kept by a worker and returned when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub persisted: u64,
    pub duplicates: u64,
    pub dead_lettered: u64,
    /// Dead-letter publishes that failed; the record was still committed
    pub dead_letter_failures: u64,
    pub persist_failures: u64,
    pub commit_failures: u64,
    pub batches: u64,
}

impl WorkerStats {
    pub fn merge(&mut self, other: &WorkerStats) {
        self.persisted += other.persisted;
        self.duplicates += other.duplicates;
        self.dead_lettered += other.dead_lettered;
        self.dead_letter_failures += other.dead_letter_failures;
        self.persist_failures += other.persist_failures;
        self.commit_failures += other.commit_failures;
        self.batches += other.batches;
    }

    /// Records whose cursor was allowed to advance
    pub fn handled(&self) -> u64 {
        self.persisted + self.duplicates + self.dead_lettered + self.dead_letter_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_merge() {
        let mut total = WorkerStats::default();
        total.merge(&WorkerStats {
            persisted: 2,
            duplicates: 1,
            dead_lettered: 1,
            ..Default::default()
        });
        total.merge(&WorkerStats {
            persisted: 3,
            dead_letter_failures: 1,
            commit_failures: 4,
            ..Default::default()
        });

        assert_eq!(total.persisted, 5);
        assert_eq!(total.commit_failures, 4);
        assert_eq!(total.handled(), 8);
    }
}
