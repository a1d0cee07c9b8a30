//! Deterministic in-process broker
//!
//! Implements [`BrokerClient`] without any network. Failures are scripted
//! up front through [`MemoryBrokerScript`] and every capability call is
//! recorded in a shared journal, which makes this the test double for the
//! lifecycle and publish paths. The relay also uses it for `--dry-run`.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{BrokerClient, DeliveryCallback, DeliveryReport, LogCallback, ProduceError};

/// One recorded capability call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    NewConfig,
    NewTopicConfig,
    SetConfig { key: String, value: String },
    SetDeliveryCallback,
    CreateProducer,
    SetLogger,
    AddBrokers(String),
    CreateTopic(String),
    Produce { topic: String, partition: Option<i32>, len: usize },
    Poll,
    Flush,
    DestroyTopic(String),
    DestroyProducer,
}

/// Per-call outcomes the broker will report
#[derive(Debug, Clone, Default)]
pub struct MemoryBrokerScript {
    rejected_keys: HashMap<String, String>,
    fail_producer: bool,
    fail_topic: bool,
    refuse_brokers: bool,
    produce_outcomes: VecDeque<Result<(), ProduceError>>,
    hold_deliveries: bool,
    echo: bool,
}

impl MemoryBrokerScript {
    /// Reject configuration key `key` with `message`
    pub fn reject_key(mut self, key: &str, message: &str) -> Self {
        self.rejected_keys.insert(key.to_string(), message.to_string());
        self
    }

    pub fn fail_producer(mut self) -> Self {
        self.fail_producer = true;
        self
    }

    pub fn fail_topic(mut self) -> Self {
        self.fail_topic = true;
        self
    }

    /// Report zero accepted brokers
    pub fn refuse_brokers(mut self) -> Self {
        self.refuse_brokers = true;
        self
    }

    /// Outcomes for the next produce calls, in order; afterwards every call succeeds
    pub fn produce_outcomes<I>(mut self, outcomes: I) -> Self
    where
        I: IntoIterator<Item = Result<(), ProduceError>>,
    {
        self.produce_outcomes.extend(outcomes);
        self
    }

    /// Reject the next `count` produce calls as transient
    pub fn queue_full(self, count: usize) -> Self {
        self.produce_outcomes(std::iter::repeat(Err(ProduceError::QueueFull)).take(count))
    }

    /// Never acknowledge queued messages, so flushes time out
    pub fn hold_deliveries(mut self) -> Self {
        self.hold_deliveries = true;
        self
    }

    /// Write each delivered payload as a line on stdout
    pub fn echo(mut self) -> Self {
        self.echo = true;
        self
    }
}

/// A message acknowledged by the in-memory broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct MemoryConfig {
    entries: Vec<(String, String)>,
    delivery: Option<DeliveryCallback>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTopicConfig;

pub struct MemoryProducer {
    delivery: Option<DeliveryCallback>,
    logger: Option<(LogCallback, log::LevelFilter)>,
    queue: VecDeque<(String, i32, Vec<u8>)>,
    next_offset: i64,
}

impl MemoryProducer {
    fn log(&self, level: log::Level, facility: &str, message: &str) {
        if let Some((logger, max)) = &self.logger {
            if level <= *max {
                logger(level, facility, message);
            }
        }
    }
}

#[derive(Debug)]
pub struct MemoryTopic {
    name: String,
}

#[derive(Default)]
pub struct MemoryBroker {
    script: MemoryBrokerScript,
    journal: Arc<Mutex<Vec<BrokerCall>>>,
    delivered: Arc<Mutex<Vec<DeliveredMessage>>>,
    applied: Arc<Mutex<Vec<(String, String)>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBroker {
    pub fn new(script: MemoryBrokerScript) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Shared view of every call made so far
    pub fn journal(&self) -> Arc<Mutex<Vec<BrokerCall>>> {
        self.journal.clone()
    }

    /// Shared view of acknowledged messages
    pub fn delivered(&self) -> Arc<Mutex<Vec<DeliveredMessage>>> {
        self.delivered.clone()
    }

    /// Configuration entries carried by the most recently created producer
    pub fn applied_config(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        self.applied.clone()
    }

    fn record(&self, call: BrokerCall) {
        lock(&self.journal).push(call);
    }

    fn deliver(&self, producer: &mut MemoryProducer) {
        while let Some((topic, partition, payload)) = producer.queue.pop_front() {
            let offset = producer.next_offset;
            producer.next_offset += 1;

            if self.script.echo {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(&payload);
                let _ = stdout.write_all(b"\n");
            }

            let report = DeliveryReport {
                topic: topic.clone(),
                partition,
                offset: Some(offset),
                error: None,
            };
            lock(&self.delivered).push(DeliveredMessage {
                topic,
                partition,
                offset,
                payload,
            });
            if let Some(callback) = &producer.delivery {
                callback(&report);
            }
        }
    }
}

impl BrokerClient for MemoryBroker {
    type Config = MemoryConfig;
    type TopicConfig = MemoryTopicConfig;
    type Producer = MemoryProducer;
    type Topic = MemoryTopic;

    fn new_config(&mut self) -> MemoryConfig {
        self.record(BrokerCall::NewConfig);
        MemoryConfig::default()
    }

    fn new_topic_config(&mut self) -> MemoryTopicConfig {
        self.record(BrokerCall::NewTopicConfig);
        MemoryTopicConfig
    }

    fn set_config(&mut self, config: &mut MemoryConfig, key: &str, value: &str) -> Result<(), String> {
        self.record(BrokerCall::SetConfig {
            key: key.to_string(),
            value: value.to_string(),
        });
        if let Some(message) = self.script.rejected_keys.get(key) {
            return Err(message.clone());
        }
        config.entries.push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn set_delivery_callback(&mut self, config: &mut MemoryConfig, callback: DeliveryCallback) {
        self.record(BrokerCall::SetDeliveryCallback);
        config.delivery = Some(callback);
    }

    fn create_producer(&mut self, config: MemoryConfig) -> Result<MemoryProducer, String> {
        self.record(BrokerCall::CreateProducer);
        if self.script.fail_producer {
            return Err("producer creation refused".to_string());
        }
        *lock(&self.applied) = config.entries;
        Ok(MemoryProducer {
            delivery: config.delivery,
            logger: None,
            queue: VecDeque::new(),
            next_offset: 0,
        })
    }

    fn set_logger(&mut self, producer: &mut MemoryProducer, logger: LogCallback, level: log::LevelFilter) {
        self.record(BrokerCall::SetLogger);
        producer.logger = Some((logger, level));
    }

    fn add_brokers(&mut self, producer: &mut MemoryProducer, brokers: &str) -> usize {
        self.record(BrokerCall::AddBrokers(brokers.to_string()));
        if self.script.refuse_brokers {
            producer.log(log::Level::Error, "BROKER", "no valid brokers specified");
            return 0;
        }
        let count = brokers.split(',').filter(|b| !b.trim().is_empty()).count();
        producer.log(
            log::Level::Debug,
            "BROKER",
            &format!("{} broker(s) registered", count),
        );
        count
    }

    fn create_topic(
        &mut self,
        _producer: &mut MemoryProducer,
        name: &str,
        _config: MemoryTopicConfig,
    ) -> Result<MemoryTopic, String> {
        self.record(BrokerCall::CreateTopic(name.to_string()));
        if self.script.fail_topic {
            return Err(format!("topic '{}' could not be created", name));
        }
        Ok(MemoryTopic {
            name: name.to_string(),
        })
    }

    fn produce(
        &mut self,
        producer: &mut MemoryProducer,
        topic: &MemoryTopic,
        partition: Option<i32>,
        payload: &[u8],
    ) -> Result<(), ProduceError> {
        self.record(BrokerCall::Produce {
            topic: topic.name.clone(),
            partition,
            len: payload.len(),
        });
        if let Some(outcome) = self.script.produce_outcomes.pop_front() {
            outcome?;
        }
        producer
            .queue
            .push_back((topic.name.clone(), partition.unwrap_or(0), payload.to_vec()));
        Ok(())
    }

    fn poll(&mut self, producer: &mut MemoryProducer, _timeout: Duration) {
        self.record(BrokerCall::Poll);
        if !self.script.hold_deliveries {
            self.deliver(producer);
        }
    }

    fn flush(&mut self, producer: &mut MemoryProducer, _timeout: Duration) -> Result<(), String> {
        self.record(BrokerCall::Flush);
        if self.script.hold_deliveries && !producer.queue.is_empty() {
            return Err(format!("{} message(s) still queued", producer.queue.len()));
        }
        self.deliver(producer);
        Ok(())
    }

    fn destroy_topic(&mut self, topic: MemoryTopic) {
        self.record(BrokerCall::DestroyTopic(topic.name));
    }

    fn destroy_producer(&mut self, _producer: MemoryProducer) {
        self.record(BrokerCall::DestroyProducer);
    }
}
