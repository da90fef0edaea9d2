use futures::future::{self, BoxFuture, FutureExt};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::debug;

use super::{Delivery, OutboundRecord};
use crate::error::{AppError, Result};

/// Producer seam used by the publisher and the dead-letter router.
///
/// `enqueue` hands the record to the transport before it returns, so records
/// enqueued one after another keep that order within a partition. The returned
/// future resolves once the transport acknowledges (or fails) the delivery.
/// Exactly one attempt is made; retries are left to the transport.
pub trait StreamProducer: Send + Sync {
    fn enqueue(&self, record: OutboundRecord) -> BoxFuture<'static, Result<Delivery>>;
}

/// rdkafka-backed producer
pub struct KafkaStreamProducer {
    producer: FutureProducer,
}

impl KafkaStreamProducer {
    pub fn new(brokers: &str, delivery_timeout: Duration) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", delivery_timeout.as_millis().to_string())
            .set("queue.buffering.max.messages", "100000")
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(AppError::Kafka)?;

        Ok(Self { producer })
    }

    /// Lightweight health check by fetching cluster metadata for `topic`
    pub fn health_check(&self, topic: &str, timeout: Duration) -> Result<()> {
        self.producer
            .client()
            .fetch_metadata(Some(topic), timeout)
            .map(|_| ())
            .map_err(AppError::Kafka)
    }

    /// Block until queued records are delivered or `timeout` elapses
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer.flush(timeout).map_err(AppError::Kafka)
    }
}

impl StreamProducer for KafkaStreamProducer {
    fn enqueue(&self, record: OutboundRecord) -> BoxFuture<'static, Result<Delivery>> {
        let mut headers = OwnedHeaders::new();
        for (key, value) in &record.headers {
            headers = headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_bytes()),
            });
        }

        let mut future_record = FutureRecord::to(&record.topic)
            .key(record.key.as_str())
            .payload(record.payload.as_str())
            .headers(headers);
        if let Some(partition) = record.partition {
            future_record = future_record.partition(partition);
        }

        debug!(
            topic = %record.topic,
            key = %record.key,
            partition = ?record.partition,
            "Enqueueing record"
        );

        match self.producer.send_result(future_record) {
            Ok(delivery) => async move {
                match delivery.await {
                    Ok(Ok((partition, offset))) => Ok(Delivery { partition, offset }),
                    Ok(Err((e, _))) => Err(AppError::Kafka(e)),
                    Err(_) => Err(AppError::Publish(
                        "delivery report channel closed before acknowledgement".to_string(),
                    )),
                }
            }
            .boxed(),
            Err((e, _)) => future::ready(Err(AppError::Kafka(e))).boxed(),
        }
    }
}
