use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::{ClientConfig, Offset};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::StreamRecord;
use crate::error::{AppError, Result};

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Read cursor over a single partition.
///
/// Each partition worker owns exactly one reader; readers are never shared.
#[async_trait]
pub trait PartitionReader: Send {
    fn partition(&self) -> i32;

    /// Wait at most `timeout` for records and return up to `max_records` of them,
    /// in partition order. An empty batch means the window elapsed.
    async fn poll(&mut self, timeout: Duration, max_records: usize) -> Result<Vec<StreamRecord>>;

    /// Durably advance the committed position past `record`.
    async fn commit(&mut self, record: &StreamRecord) -> Result<()>;

    /// Move the read position back to `offset` so the next poll starts there.
    async fn rewind(&mut self, offset: i64) -> Result<()>;
}

/// rdkafka reader with a manual single-partition assignment.
///
/// Auto-commit is off: the position is only committed through [`PartitionReader::commit`].
/// Commit and seek are synchronous librdkafka calls and run under
/// `block_in_place`, which requires the multi-threaded Tokio runtime.
pub struct KafkaPartitionReader {
    consumer: StreamConsumer,
    topic: String,
    partition: i32,
}

impl KafkaPartitionReader {
    pub fn new(brokers: &str, group_id: &str, topic: &str, partition: i32) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false") // Manual commit after durable write
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(AppError::Kafka)?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, Offset::Stored)
            .map_err(AppError::Kafka)?;
        consumer.assign(&tpl).map_err(AppError::Kafka)?;

        info!(
            topic = %topic,
            partition = partition,
            group_id = %group_id,
            "Partition reader assigned"
        );

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            partition,
        })
    }
}

fn to_stream_record(msg: &BorrowedMessage<'_>) -> StreamRecord {
    let headers = msg
        .headers()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|header| {
                    let value = std::str::from_utf8(header.value?).ok()?;
                    Some((header.key.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    StreamRecord {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg
            .key()
            .and_then(|key| std::str::from_utf8(key).ok())
            .map(str::to_string),
        payload: msg
            .payload_view::<str>()
            .and_then(|payload| payload.ok())
            .map(str::to_string),
        headers,
    }
}

#[async_trait]
impl PartitionReader for KafkaPartitionReader {
    fn partition(&self) -> i32 {
        self.partition
    }

    async fn poll(&mut self, timeout: Duration, max_records: usize) -> Result<Vec<StreamRecord>> {
        let mut batch = Vec::new();
        let mut deadline = Instant::now() + timeout;

        while batch.len() < max_records {
            match tokio::time::timeout_at(deadline, self.consumer.recv()).await {
                Err(_) => break,
                Ok(Ok(msg)) => {
                    batch.push(to_stream_record(&msg));
                    // Once something arrived, only drain what is already buffered
                    deadline = Instant::now();
                }
                Ok(Err(e)) => {
                    if batch.is_empty() {
                        return Err(AppError::Kafka(e));
                    }
                    warn!(
                        partition = self.partition,
                        error = %e,
                        "Kafka error after partial batch, returning what was read"
                    );
                    break;
                }
            }
        }

        if !batch.is_empty() {
            debug!(
                partition = self.partition,
                count = batch.len(),
                "Polled batch"
            );
        }

        Ok(batch)
    }

    async fn commit(&mut self, record: &StreamRecord) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, Offset::Offset(record.offset + 1))
            .map_err(AppError::Kafka)?;

        tokio::task::block_in_place(|| self.consumer.commit(&tpl, CommitMode::Sync))
            .map_err(AppError::Kafka)?;

        debug!(
            topic = %self.topic,
            partition = self.partition,
            offset = record.offset + 1,
            "Committed offset"
        );
        Ok(())
    }

    async fn rewind(&mut self, offset: i64) -> Result<()> {
        tokio::task::block_in_place(|| {
            self.consumer
                .seek(&self.topic, self.partition, Offset::Offset(offset), SEEK_TIMEOUT)
        })
        .map_err(AppError::Kafka)?;

        debug!(
            topic = %self.topic,
            partition = self.partition,
            offset = offset,
            "Rewound read position"
        );
        Ok(())
    }
}
