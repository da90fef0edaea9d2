//! Stream transport seams and their implementations
//!
//! - [`StreamProducer`]: enqueue a record, get a future for its delivery
//! - [`PartitionReader`]: cursor over exactly one partition (poll, commit, rewind)
//!
//! rdkafka backs both in production; [`memory::InMemoryBroker`] backs both in tests.

pub mod memory;
pub mod producer;
pub mod reader;

pub use memory::{InMemoryBroker, InMemoryPartitionReader};
pub use producer::{KafkaStreamProducer, StreamProducer};
pub use reader::{KafkaPartitionReader, PartitionReader};

/// A record to be written to a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    /// Explicit partition; `None` lets the transport pick one
    pub partition: Option<i32>,
    pub key: String,
    pub payload: String,
    pub headers: Vec<(String, String)>,
}

impl OutboundRecord {
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            key: key.into(),
            payload: payload.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Where a record landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// A record read from a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl StreamRecord {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}
