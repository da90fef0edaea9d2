//! In-process partitioned broker.
//!
//! Implements both transport seams over shared in-memory partition logs so the
//! whole publish → consume → commit path runs without Kafka. Used by the test
//! suites; supports injected publish and commit failures.

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Delivery, OutboundRecord, PartitionReader, StreamProducer, StreamRecord};
use crate::error::{AppError, Result};

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<StreamRecord>>>,
    committed: HashMap<(String, i32), i64>,
    failing_topics: HashSet<String>,
    failing_commits: usize,
}

/// Shared handle to the in-memory broker. Clones see the same state.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `topic` with `partitions` empty partitions (no-op if it exists)
    pub fn create_topic(&self, topic: &str, partitions: i32) {
        let count = usize::try_from(partitions).unwrap_or(0);
        self.lock()
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); count]);
    }

    /// Reader positioned at the committed offset of `topic`/`partition` (or 0)
    pub fn reader(&self, topic: &str, partition: i32) -> InMemoryPartitionReader {
        let position = self.committed_offset(topic, partition).unwrap_or(0);
        InMemoryPartitionReader {
            broker: self.clone(),
            topic: topic.to_string(),
            partition,
            position,
        }
    }

    /// Records in one partition, in offset order
    pub fn records(&self, topic: &str, partition: i32) -> Vec<StreamRecord> {
        let state = self.lock();
        usize::try_from(partition)
            .ok()
            .and_then(|index| state.topics.get(topic)?.get(index).cloned())
            .unwrap_or_default()
    }

    /// Records across every partition of `topic`
    pub fn all_records(&self, topic: &str) -> Vec<StreamRecord> {
        self.lock()
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Next offset to consume as last committed, if any commit happened
    pub fn committed_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.lock()
            .committed
            .get(&(topic.to_string(), partition))
            .copied()
    }

    /// Refuse every publish to `topic` until [`InMemoryBroker::heal_topic`]
    pub fn fail_topic(&self, topic: &str) {
        self.lock().failing_topics.insert(topic.to_string());
    }

    pub fn heal_topic(&self, topic: &str) {
        self.lock().failing_topics.remove(topic);
    }

    /// Refuse the next `n` commits
    pub fn fail_next_commits(&self, n: usize) {
        self.lock().failing_commits = n;
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, record: OutboundRecord) -> Result<Delivery> {
        let mut state = self.lock();

        if state.failing_topics.contains(&record.topic) {
            return Err(AppError::Publish(format!(
                "topic {} is refusing writes",
                record.topic
            )));
        }

        let partitions = state
            .topics
            .get_mut(&record.topic)
            .ok_or_else(|| AppError::Publish(format!("unknown topic {}", record.topic)))?;
        if partitions.is_empty() {
            return Err(AppError::Publish(format!(
                "topic {} has no partitions",
                record.topic
            )));
        }

        let index = match record.partition {
            Some(partition) => usize::try_from(partition)
                .ok()
                .filter(|index| *index < partitions.len())
                .ok_or_else(|| {
                    AppError::Publish(format!(
                        "partition {} out of range for topic {}",
                        partition, record.topic
                    ))
                })?,
            None => {
                let mut hasher = DefaultHasher::new();
                record.key.hash(&mut hasher);
                (hasher.finish() % partitions.len() as u64) as usize
            }
        };

        let log = &mut partitions[index];
        let offset = log.len() as i64;
        let partition = index as i32;
        log.push(StreamRecord {
            topic: record.topic,
            partition,
            offset,
            key: Some(record.key),
            payload: Some(record.payload),
            headers: record.headers,
        });

        Ok(Delivery { partition, offset })
    }
}

impl StreamProducer for InMemoryBroker {
    fn enqueue(&self, record: OutboundRecord) -> BoxFuture<'static, Result<Delivery>> {
        future::ready(self.append(record)).boxed()
    }
}

/// Cursor over one partition of an [`InMemoryBroker`] topic
pub struct InMemoryPartitionReader {
    broker: InMemoryBroker,
    topic: String,
    partition: i32,
    position: i64,
}

impl InMemoryPartitionReader {
    /// Offset of the next record this reader will return
    pub fn position(&self) -> i64 {
        self.position
    }
}

#[async_trait]
impl PartitionReader for InMemoryPartitionReader {
    fn partition(&self) -> i32 {
        self.partition
    }

    async fn poll(&mut self, timeout: Duration, max_records: usize) -> Result<Vec<StreamRecord>> {
        let start = usize::try_from(self.position).unwrap_or(0);
        let batch: Vec<StreamRecord> = self
            .broker
            .records(&self.topic, self.partition)
            .into_iter()
            .skip(start)
            .take(max_records)
            .collect();

        if batch.is_empty() {
            tokio::time::sleep(timeout).await;
            return Ok(batch);
        }

        self.position += batch.len() as i64;
        Ok(batch)
    }

    async fn commit(&mut self, record: &StreamRecord) -> Result<()> {
        let mut state = self.broker.lock();
        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(AppError::Commit(format!(
                "commit of {}/{}@{} refused",
                self.topic, self.partition, record.offset
            )));
        }

        state
            .committed
            .insert((self.topic.clone(), self.partition), record.offset + 1);
        Ok(())
    }

    async fn rewind(&mut self, offset: i64) -> Result<()> {
        self.position = offset;
        Ok(())
    }
}
