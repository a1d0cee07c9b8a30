//! Broker producer lifecycle
//!
//! [`Producer::initialize`] performs the ordered, fail-fast creation sequence:
//! 1. base and topic-level configuration objects
//! 2. every configuration entry, validated one key at a time
//! 3. delivery callback registration (must precede producer creation)
//! 4. producer creation
//! 5. logger and log level installation
//! 6. broker endpoint list registration
//! 7. target topic handle creation
//!
//! A `Producer` value only exists once all seven stages succeeded, so nothing
//! can be published through a partially initialized client.

pub mod publish;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::broker::{BrokerClient, DeliveryReport, LogCallback};
use crate::config::BrokerConfig;
use crate::error::{AuditError, Stage};
use crate::models::DeliveryResult;
pub use publish::{PublishStats, RetryPolicy, StatsSnapshot};

/// Everything the lifecycle needs to bring a producer up
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    /// Comma-separated `host:port` list
    pub brokers: String,
    /// Topic created eagerly at startup and used by default
    pub topic: String,
    /// Entries applied verbatim to the base configuration, in order
    pub config: BrokerConfig,
    pub log_level: log::LevelFilter,
    pub retry: RetryPolicy,
}

/// Fully initialized producer with its cached topic handles.
///
/// Topic handles are declared before the producer handle so that, even
/// without an explicit [`Producer::shutdown`], they are released first.
pub struct Producer<C: BrokerClient> {
    topics: HashMap<String, C::Topic>,
    handle: C::Producer,
    client: C,
    topic_config: C::TopicConfig,
    default_topic: String,
    retry: RetryPolicy,
    stats: Arc<PublishStats>,
}

impl<C: BrokerClient> Producer<C> {
    pub fn initialize(
        mut client: C,
        settings: &ProducerSettings,
        logger: LogCallback,
    ) -> Result<Self, AuditError> {
        let mut config = client.new_config();
        let topic_config = client.new_topic_config();

        for (key, value) in settings.config.iter() {
            client
                .set_config(&mut config, key, value)
                .map_err(|message| AuditError::ConfigValidation {
                    key: key.to_string(),
                    message,
                })?;
        }

        let stats = Arc::new(PublishStats::default());
        let delivery_stats = stats.clone();
        client.set_delivery_callback(
            &mut config,
            Arc::new(move |report: &DeliveryReport| {
                delivery_stats.record_delivery(report);
                if let Some(error) = &report.error {
                    log::warn!(
                        "delivery to {} [{}] failed: {}",
                        report.topic,
                        report.partition,
                        error
                    );
                }
            }),
        );

        let mut handle = client
            .create_producer(config)
            .map_err(|message| AuditError::ResourceCreation {
                stage: Stage::Producer,
                message,
            })?;

        client.set_logger(&mut handle, logger, settings.log_level);

        if client.add_brokers(&mut handle, &settings.brokers) == 0 {
            client.destroy_producer(handle);
            return Err(AuditError::ConnectivityAcceptance {
                brokers: settings.brokers.clone(),
            });
        }

        let topic = match client.create_topic(&mut handle, &settings.topic, topic_config.clone()) {
            Ok(topic) => topic,
            Err(message) => {
                client.destroy_producer(handle);
                return Err(AuditError::ResourceCreation {
                    stage: Stage::Topic,
                    message,
                });
            }
        };

        log::info!(
            "producer ready: brokers={} topic={}",
            settings.brokers,
            settings.topic
        );

        let mut topics = HashMap::new();
        topics.insert(settings.topic.clone(), topic);

        Ok(Self {
            topics,
            handle,
            client,
            topic_config,
            default_topic: settings.topic.clone(),
            retry: settings.retry,
            stats,
        })
    }

    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    pub fn stats(&self) -> Arc<PublishStats> {
        self.stats.clone()
    }

    /// Publish to the topic created at startup
    pub fn publish(&mut self, payload: &[u8]) -> Result<DeliveryResult, AuditError> {
        let topic = self.default_topic.clone();
        self.publish_to(&topic, payload)
    }

    /// Publish to `topic`, creating and caching its handle on first use
    pub fn publish_to(&mut self, topic: &str, payload: &[u8]) -> Result<DeliveryResult, AuditError> {
        if !self.topics.contains_key(topic) {
            let created = self
                .client
                .create_topic(&mut self.handle, topic, self.topic_config.clone())
                .map_err(|message| AuditError::ResourceCreation {
                    stage: Stage::Topic,
                    message,
                })?;
            self.topics.insert(topic.to_string(), created);
        }

        let Some(handle) = self.topics.get(topic) else {
            return Err(AuditError::ResourceCreation {
                stage: Stage::Topic,
                message: format!("topic '{}' missing from cache", topic),
            });
        };
        publish::publish(
            &mut self.client,
            &mut self.handle,
            handle,
            payload,
            &self.retry,
            &self.stats,
        )
    }

    /// Serve delivery callbacks for acknowledged messages
    pub fn poll(&mut self, timeout: Duration) {
        self.client.poll(&mut self.handle, timeout);
    }

    /// Flush pending deliveries (bounded by `timeout`), then destroy topic
    /// handles, then the producer handle. Returns whether the flush
    /// completed before the deadline.
    pub fn shutdown(self, timeout: Duration) -> bool {
        let Producer {
            topics,
            mut handle,
            mut client,
            ..
        } = self;

        let flushed = match client.flush(&mut handle, timeout) {
            Ok(()) => true,
            Err(reason) => {
                log::warn!("flush did not complete within {:?}: {}", timeout, reason);
                false
            }
        };
        for (_, topic) in topics {
            client.destroy_topic(topic);
        }
        client.destroy_producer(handle);
        flushed
    }
}
