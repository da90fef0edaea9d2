use idempotent_ledger::LedgerStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{PartitionWorker, WorkerSettings, WorkerStats};
use crate::dlq::DeadLetterRouter;
use crate::error::Result;
use crate::kafka::PartitionReader;
use crate::routing::PartitionRouter;

/// What the workers reported when the engine stopped
#[derive(Debug, Default)]
pub struct EngineReport {
    pub stats: BTreeMap<i32, WorkerStats>,
    /// Partitions whose worker did not stop in time and was aborted
    pub timed_out: Vec<i32>,
    /// Partitions whose worker panicked
    pub failed: Vec<i32>,
}

impl EngineReport {
    pub fn total(&self) -> WorkerStats {
        let mut total = WorkerStats::default();
        for stats in self.stats.values() {
            total.merge(stats);
        }
        total
    }

    pub fn is_clean(&self) -> bool {
        self.timed_out.is_empty() && self.failed.is_empty()
    }
}

/// Worker-per-partition supervisor.
///
/// Every worker is an independent task bound to one partition index; they are
/// coordinated only through the shared ledger store and a single shutdown
/// signal.
pub struct ConsumptionEngine {
    shutdown: watch::Sender<bool>,
    workers: Vec<(i32, JoinHandle<WorkerStats>)>,
}

impl ConsumptionEngine {
    /// Build one reader per partition with `reader_factory` and spawn a worker
    /// for each. If any reader cannot be built, workers already spawned are
    /// told to stop and the error is returned.
    pub fn start<R, F, P>(
        partitions: P,
        mut reader_factory: F,
        store: Arc<dyn LedgerStore>,
        dead_letters: Arc<DeadLetterRouter>,
        router: &PartitionRouter,
        settings: WorkerSettings,
    ) -> Result<Self>
    where
        R: PartitionReader + 'static,
        F: FnMut(i32) -> Result<R>,
        P: IntoIterator<Item = i32>,
    {
        let (shutdown, _) = watch::channel(false);
        let mut workers = Vec::new();

        for partition in partitions {
            let reader = match reader_factory(partition) {
                Ok(reader) => reader,
                Err(e) => {
                    error!(
                        partition = partition,
                        error = %e,
                        "Failed to create partition reader"
                    );
                    let _ = shutdown.send(true);
                    return Err(e);
                }
            };

            let worker = PartitionWorker::new(
                reader,
                Arc::clone(&store),
                Arc::clone(&dead_letters),
                router.city_for_partition(partition),
                settings.clone(),
            );
            workers.push((partition, tokio::spawn(worker.run(shutdown.subscribe()))));
        }

        info!(workers = workers.len(), "Consumption engine started");

        Ok(Self { shutdown, workers })
    }

    pub fn partitions(&self) -> Vec<i32> {
        self.workers.iter().map(|(partition, _)| *partition).collect()
    }

    /// Signal every worker to stop and wait up to `timeout` in total.
    ///
    /// Workers still running at the deadline are aborted and listed in
    /// [`EngineReport::timed_out`].
    pub async fn shutdown(self, timeout: Duration) -> EngineReport {
        info!("Stopping consumption engine");
        let _ = self.shutdown.send(true);

        let deadline = Instant::now() + timeout;
        let mut report = EngineReport::default();

        for (partition, mut handle) in self.workers {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(stats)) => {
                    report.stats.insert(partition, stats);
                }
                Ok(Err(e)) => {
                    error!(partition = partition, error = %e, "Partition worker panicked");
                    report.failed.push(partition);
                }
                Err(_) => {
                    warn!(partition = partition, "Partition worker did not stop in time, aborting");
                    handle.abort();
                    report.timed_out.push(partition);
                }
            }
        }

        let total = report.total();
        info!(
            persisted = total.persisted,
            duplicates = total.duplicates,
            dead_lettered = total.dead_lettered,
            dead_letter_failures = total.dead_letter_failures,
            persist_failures = total.persist_failures,
            commit_failures = total.commit_failures,
            timed_out = report.timed_out.len(),
            "Consumption engine stopped"
        );

        report
    }
}
