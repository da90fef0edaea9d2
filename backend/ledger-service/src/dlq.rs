//! Dead-Letter Router
//!
//! Re-emits rejected transactions to the failure topic. No partition routing is
//! applied; the transport picks the partition from the key.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, warn};

use crate::kafka::{OutboundRecord, StreamProducer, StreamRecord};
use crate::models::RejectReason;
use crate::publisher::PublishOutcome;

pub const HEADER_REASON: &str = "dlq_reason";
pub const HEADER_TIMESTAMP: &str = "dlq_timestamp";
pub const HEADER_SOURCE_TOPIC: &str = "source_topic";
pub const HEADER_SOURCE_PARTITION: &str = "source_partition";
pub const HEADER_SOURCE_OFFSET: &str = "source_offset";

pub struct DeadLetterRouter {
    producer: Arc<dyn StreamProducer>,
    topic: String,
}

impl DeadLetterRouter {
    pub fn new(producer: Arc<dyn StreamProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Send a rejected transaction to the failure topic.
    ///
    /// One attempt; the outcome is logged and returned, never raised. The
    /// payload is forwarded unchanged.
    pub async fn reject(
        &self,
        id: &str,
        payload: &str,
        reason: &RejectReason,
        source: Option<&StreamRecord>,
    ) -> PublishOutcome {
        let mut record = OutboundRecord::new(self.topic.as_str(), id, payload)
            .with_header(HEADER_REASON, reason.code())
            .with_header(HEADER_TIMESTAMP, Utc::now().to_rfc3339());

        if let Some(source) = source {
            record = record
                .with_header(HEADER_SOURCE_TOPIC, source.topic.as_str())
                .with_header(HEADER_SOURCE_PARTITION, source.partition.to_string())
                .with_header(HEADER_SOURCE_OFFSET, source.offset.to_string());
        }

        match self.producer.enqueue(record).await {
            Ok(delivery) => {
                warn!(
                    transaction_id = %id,
                    reason = %reason,
                    dlq_topic = %self.topic,
                    dlq_partition = delivery.partition,
                    dlq_offset = delivery.offset,
                    "Transaction sent to dead-letter topic"
                );
                PublishOutcome::Delivered {
                    partition: delivery.partition,
                    offset: delivery.offset,
                }
            }
            Err(e) => {
                error!(
                    transaction_id = %id,
                    reason = %reason,
                    dlq_topic = %self.topic,
                    error = %e,
                    "Failed to send transaction to dead-letter topic"
                );
                PublishOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::InMemoryBroker;

    const DLQ: &str = "transactions-dlq";

    #[tokio::test]
    async fn test_reject_writes_payload_and_headers() {
        let broker = InMemoryBroker::new();
        broker.create_topic(DLQ, 1);
        let router = DeadLetterRouter::new(Arc::new(broker.clone()), DLQ);

        let source = StreamRecord {
            topic: "transactions".to_string(),
            partition: 2,
            offset: 41,
            key: Some("T2".to_string()),
            payload: Some(r#"{"amount":-50}"#.to_string()),
            headers: Vec::new(),
        };

        let outcome = router
            .reject(
                "T2",
                r#"{"amount":-50}"#,
                &RejectReason::NegativeAmount(-50.0),
                Some(&source),
            )
            .await;
        assert!(outcome.is_delivered());

        let records = broker.all_records(DLQ);
        assert_eq!(records.len(), 1);
        let dead = &records[0];
        assert_eq!(dead.key.as_deref(), Some("T2"));
        assert_eq!(dead.payload.as_deref(), Some(r#"{"amount":-50}"#));
        assert_eq!(dead.header(HEADER_REASON), Some("negative_amount"));
        assert_eq!(dead.header(HEADER_SOURCE_TOPIC), Some("transactions"));
        assert_eq!(dead.header(HEADER_SOURCE_PARTITION), Some("2"));
        assert_eq!(dead.header(HEADER_SOURCE_OFFSET), Some("41"));
        assert!(dead.header(HEADER_TIMESTAMP).is_some());
    }

    #[tokio::test]
    async fn test_reject_failure_is_returned() {
        let broker = InMemoryBroker::new();
        broker.create_topic(DLQ, 1);
        broker.fail_topic(DLQ);
        let router = DeadLetterRouter::new(Arc::new(broker.clone()), DLQ);

        let outcome = router
            .reject("T2", "{}", &RejectReason::MissingTransactionId, None)
            .await;
        assert!(matches!(outcome, PublishOutcome::Failed(_)));
        assert!(broker.all_records(DLQ).is_empty());
    }
}
