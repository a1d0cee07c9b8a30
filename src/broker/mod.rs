//! Broker client abstraction
//!
//! The capability set the producer lifecycle and publish executor depend on:
//! - configuration objects and per-key validation
//! - producer and topic handle creation and destruction
//! - enqueueing payloads and servicing delivery reports
//!
//! Implementations are not required to be `Sync`. Every capability takes
//! `&mut self`, so all publish calls are serialized through whoever owns the
//! client (in practice the [`crate::producer::Producer`] wrapper).

use std::sync::Arc;
use std::time::Duration;

pub mod memory;

#[cfg(feature = "kafka")]
pub mod kafka;

/// Partition sentinel letting the broker client choose the partition
pub const PARTITION_UNASSIGNED: Option<i32> = None;

/// Asynchronous per-message acknowledgment, invoked from `poll`/`flush`
pub type DeliveryCallback = Arc<dyn Fn(&DeliveryReport) + Send + Sync>;

/// Receives log lines emitted by the broker client: level, facility, message
pub type LogCallback = Arc<dyn Fn(log::Level, &str, &str) + Send + Sync>;

/// Broker-side outcome of one previously enqueued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub topic: String,
    pub partition: i32,
    /// Offset assigned by the broker, absent on failure
    pub offset: Option<i64>,
    /// Failure reason, absent on success
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Synchronous rejection of a produce call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProduceError {
    #[error("local queue is full")]
    QueueFull,
    #[error("unknown topic")]
    UnknownTopic,
    #[error("message too large")]
    MessageTooLarge,
    #[error("{0}")]
    Other(String),
}

impl ProduceError {
    /// Transient rejections clear up once the local queue drains
    pub fn is_transient(&self) -> bool {
        matches!(self, ProduceError::QueueFull)
    }
}

/// Capability set of a message-broker client
pub trait BrokerClient {
    /// Base (client-level) configuration under construction
    type Config;
    /// Topic-level configuration, cloned for every lazily created topic
    type TopicConfig: Clone;
    /// Live connection to the broker; owns every topic created from it
    type Producer;
    /// Handle bound to one producer and one topic name
    type Topic;

    fn new_config(&mut self) -> Self::Config;

    fn new_topic_config(&mut self) -> Self::TopicConfig;

    /// Apply one entry; `Err` carries the client's explanation
    fn set_config(&mut self, config: &mut Self::Config, key: &str, value: &str)
        -> Result<(), String>;

    /// Only takes effect when registered before `create_producer`
    fn set_delivery_callback(&mut self, config: &mut Self::Config, callback: DeliveryCallback);

    fn create_producer(&mut self, config: Self::Config) -> Result<Self::Producer, String>;

    fn set_logger(
        &mut self,
        producer: &mut Self::Producer,
        logger: LogCallback,
        level: log::LevelFilter,
    );

    /// Register a comma-separated `host:port` list. Returns the number of
    /// brokers accepted; connections are established lazily.
    fn add_brokers(&mut self, producer: &mut Self::Producer, brokers: &str) -> usize;

    fn create_topic(
        &mut self,
        producer: &mut Self::Producer,
        name: &str,
        config: Self::TopicConfig,
    ) -> Result<Self::Topic, String>;

    /// Enqueue a payload. The payload is borrowed only for the duration of
    /// the call; implementations that queue it must copy it.
    fn produce(
        &mut self,
        producer: &mut Self::Producer,
        topic: &Self::Topic,
        partition: Option<i32>,
        payload: &[u8],
    ) -> Result<(), ProduceError>;

    /// Serve pending delivery reports, waiting at most `timeout`
    fn poll(&mut self, producer: &mut Self::Producer, timeout: Duration);

    /// Wait up to `timeout` for every queued message to be acknowledged
    fn flush(&mut self, producer: &mut Self::Producer, timeout: Duration) -> Result<(), String>;

    fn destroy_topic(&mut self, topic: Self::Topic);

    fn destroy_producer(&mut self, producer: Self::Producer);
}
