//! Event Publisher
//!
//! Routes each transaction to its city partition and hands it to the stream
//! producer. Publishing is fire-and-forget for the caller: the outcome is logged
//! when the transport reports it and is also available through the returned
//! [`PublishHandle`] for callers that want to wait.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::kafka::{OutboundRecord, StreamProducer};
use crate::models::TransactionEvent;
use crate::routing::PartitionRouter;

/// Result of one publish attempt. Never raised as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered { partition: i32, offset: i64 },
    Failed(String),
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered { .. })
    }
}

/// Completion handle for one publish. Dropping it does not cancel the publish.
pub type PublishHandle = JoinHandle<PublishOutcome>;

pub struct EventPublisher {
    producer: Arc<dyn StreamProducer>,
    router: PartitionRouter,
    topic: String,
}

impl EventPublisher {
    pub fn new(
        producer: Arc<dyn StreamProducer>,
        router: PartitionRouter,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            producer,
            router,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one transaction keyed by `id` into its city partition.
    ///
    /// The record is enqueued before this returns, so successive calls for the
    /// same city keep their order in the partition. Exactly one attempt is made.
    /// Must be called from within a Tokio runtime.
    pub fn publish(&self, id: &str, payload: &str) -> PublishHandle {
        if id.is_empty() {
            error!(topic = %self.topic, "Refusing to publish transaction without id");
            return tokio::spawn(async {
                PublishOutcome::Failed("transaction id must not be empty".to_string())
            });
        }

        let event = TransactionEvent::new(id, payload);
        let partition = self.router.route_payload(event.payload());
        let record = OutboundRecord::new(self.topic.as_str(), event.id(), event.payload())
            .with_partition(partition);
        let delivery = self.producer.enqueue(record);

        let transaction_id = event.id().to_string();
        let city = self.router.city_for_partition(partition).to_string();
        tokio::spawn(async move {
            match delivery.await {
                Ok(delivery) => {
                    info!(
                        transaction_id = %transaction_id,
                        city = %city,
                        partition = delivery.partition,
                        offset = delivery.offset,
                        "Transaction published"
                    );
                    PublishOutcome::Delivered {
                        partition: delivery.partition,
                        offset: delivery.offset,
                    }
                }
                Err(e) => {
                    error!(
                        transaction_id = %transaction_id,
                        partition = partition,
                        error = %e,
                        "Failed to publish transaction"
                    );
                    PublishOutcome::Failed(e.to_string())
                }
            }
        })
    }

    /// Submission interface: route and publish every entry independently.
    ///
    /// Entries for the same city keep their submission order; nothing is
    /// promised across cities.
    pub fn submit_all<I, K, V>(&self, transactions: I) -> Vec<PublishHandle>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        transactions
            .into_iter()
            .map(|(id, payload)| self.publish(id.as_ref(), payload.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::InMemoryBroker;
    use tokio_test::assert_ok;

    const TOPIC: &str = "transactions";

    fn publisher(broker: &InMemoryBroker) -> EventPublisher {
        broker.create_topic(TOPIC, 4);
        EventPublisher::new(
            Arc::new(broker.clone()),
            PartitionRouter::new(["CityA", "CityB", "CityC", "CityD"]),
            TOPIC,
        )
    }

    #[tokio::test]
    async fn test_publish_routes_by_city() {
        let broker = InMemoryBroker::new();
        let publisher = publisher(&broker);

        let outcome = publisher
            .publish("T1", r#"{"city":"CityC","amount":10}"#)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Delivered {
                partition: 2,
                offset: 0
            }
        );

        let records = broker.records(TOPIC, 2);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_unknown_city_goes_to_default_partition() {
        let broker = InMemoryBroker::new();
        let publisher = publisher(&broker);

        let outcome = publisher
            .publish("T3", r#"{"city":"UnknownCity","amount":10}"#)
            .await
            .unwrap();
        assert!(matches!(outcome, PublishOutcome::Delivered { partition: 0, .. }));
    }

    #[tokio::test]
    async fn test_empty_id_is_refused() {
        let broker = InMemoryBroker::new();
        let publisher = publisher(&broker);

        let outcome = publisher.publish("", r#"{"city":"CityA"}"#).await.unwrap();
        assert!(!outcome.is_delivered());
        assert!(broker.all_records(TOPIC).is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_not_raised() {
        let broker = InMemoryBroker::new();
        let publisher = publisher(&broker);
        broker.fail_topic(TOPIC);

        let outcome = publisher.publish("T1", r#"{"city":"CityA"}"#).await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_submit_all_keeps_per_city_order() {
        let broker = InMemoryBroker::new();
        let publisher = publisher(&broker);

        let batch = vec![
            ("A1", r#"{"city":"CityA","amount":1}"#),
            ("B1", r#"{"city":"CityB","amount":1}"#),
            ("A2", r#"{"city":"CityA","amount":2}"#),
            ("A3", r#"{"city":"CityA","amount":3}"#),
        ];
        for handle in publisher.submit_all(batch) {
            let outcome = assert_ok!(handle.await);
            assert!(outcome.is_delivered());
        }

        let keys: Vec<_> = broker
            .records(TOPIC, 0)
            .into_iter()
            .filter_map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["A1", "A2", "A3"]);
        assert_eq!(broker.records(TOPIC, 1).len(), 1);
    }
}
