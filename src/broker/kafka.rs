//! librdkafka-backed broker client
//!
//! Maps the capability set onto `rdkafka`:
//! - each configuration entry is validated on its own by building a native
//!   configuration holding just that entry
//! - the delivery callback travels inside the producer context, so it only
//!   exists if registered before the producer is created
//! - the broker list is added to the live handle with `rd_kafka_brokers_add`
//! - topic handles and the topic-level configuration are native
//!   `rd_kafka_topic_t` / `rd_kafka_topic_conf_t` objects, released on drop
//!
//! A topic handle must not outlive the producer it was created from.
//! [`crate::producer::Producer`] destroys topics first.

use std::ffi::{CStr, CString};
use std::ptr::NonNull;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rdkafka::client::ClientContext;
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseProducer, BaseRecord, DeliveryResult, Producer, ProducerContext};

use super::{BrokerClient, DeliveryCallback, DeliveryReport, LogCallback, ProduceError};

type SharedLogger = Arc<RwLock<Option<(LogCallback, log::LevelFilter)>>>;

#[derive(Debug, Default)]
pub struct KafkaBroker;

pub struct KafkaConfig {
    inner: ClientConfig,
    delivery: Option<DeliveryCallback>,
}

/// Owned `rd_kafka_topic_conf_t`
pub struct KafkaTopicConfig {
    native: *mut rdkafka_sys::RDKafkaTopicConf,
}

/// Owned `rd_kafka_topic_t`, bound to the producer it was created on
pub struct KafkaTopic {
    name: String,
    native: NonNull<rdkafka_sys::RDKafkaTopic>,
}

pub struct KafkaProducer {
    inner: BaseProducer<RelayContext>,
    logger: SharedLogger,
}

/// Producer context carrying the delivery and log callbacks
pub struct RelayContext {
    delivery: Option<DeliveryCallback>,
    logger: SharedLogger,
}

impl KafkaTopicConfig {
    fn new() -> Self {
        // SAFETY: no preconditions; librdkafka aborts rather than return null
        let native = unsafe { rdkafka_sys::rd_kafka_topic_conf_new() };
        Self { native }
    }

    fn into_raw(self) -> *mut rdkafka_sys::RDKafkaTopicConf {
        let native = self.native;
        std::mem::forget(self);
        native
    }
}

impl Clone for KafkaTopicConfig {
    fn clone(&self) -> Self {
        // SAFETY: `self.native` is a live topic configuration we own
        let native = unsafe { rdkafka_sys::rd_kafka_topic_conf_dup(self.native) };
        Self { native }
    }
}

impl Drop for KafkaTopicConfig {
    fn drop(&mut self) {
        // SAFETY: owned and not yet handed to rd_kafka_topic_new
        unsafe { rdkafka_sys::rd_kafka_topic_conf_destroy(self.native) };
    }
}

impl Drop for KafkaTopic {
    fn drop(&mut self) {
        // SAFETY: the handle came from rd_kafka_topic_new and is released once
        unsafe { rdkafka_sys::rd_kafka_topic_destroy(self.native.as_ptr()) };
    }
}

fn last_error() -> String {
    // SAFETY: both calls only read librdkafka's thread-local error state and
    // rd_kafka_err2str returns a static string
    unsafe {
        let code = rdkafka_sys::rd_kafka_last_error();
        CStr::from_ptr(rdkafka_sys::rd_kafka_err2str(code))
            .to_string_lossy()
            .into_owned()
    }
}

/// syslog severity librdkafka filters its own log output with
fn native_log_level(level: log::LevelFilter) -> i32 {
    match level {
        log::LevelFilter::Off => 0,
        log::LevelFilter::Error => 3,
        log::LevelFilter::Warn => 4,
        log::LevelFilter::Info => 6,
        log::LevelFilter::Debug | log::LevelFilter::Trace => 7,
    }
}

fn log_level(level: RDKafkaLogLevel) -> log::Level {
    match level {
        RDKafkaLogLevel::Emerg
        | RDKafkaLogLevel::Alert
        | RDKafkaLogLevel::Critical
        | RDKafkaLogLevel::Error => log::Level::Error,
        RDKafkaLogLevel::Warning => log::Level::Warn,
        RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => log::Level::Info,
        RDKafkaLogLevel::Debug => log::Level::Debug,
    }
}

impl ClientContext for RelayContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        let guard = match self.logger.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((logger, max)) = guard.as_ref() {
            let level = log_level(level);
            if level <= *max {
                logger(level, fac, log_message);
            }
        }
    }
}

impl ProducerContext for RelayContext {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        let Some(callback) = &self.delivery else {
            return;
        };
        let report = match delivery_result {
            Ok(message) => DeliveryReport {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: Some(message.offset()),
                error: None,
            },
            Err((err, message)) => DeliveryReport {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: None,
                error: Some(err.to_string()),
            },
        };
        callback(&report);
    }
}

fn classify(err: KafkaError) -> ProduceError {
    match err {
        KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull) => ProduceError::QueueFull,
        KafkaError::MessageProduction(
            RDKafkaErrorCode::UnknownTopic | RDKafkaErrorCode::UnknownTopicOrPartition,
        ) => ProduceError::UnknownTopic,
        KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge) => {
            ProduceError::MessageTooLarge
        }
        other => ProduceError::Other(other.to_string()),
    }
}

impl BrokerClient for KafkaBroker {
    type Config = KafkaConfig;
    type TopicConfig = KafkaTopicConfig;
    type Producer = KafkaProducer;
    type Topic = KafkaTopic;

    fn new_config(&mut self) -> KafkaConfig {
        KafkaConfig {
            inner: ClientConfig::new(),
            delivery: None,
        }
    }

    fn new_topic_config(&mut self) -> KafkaTopicConfig {
        KafkaTopicConfig::new()
    }

    fn set_config(&mut self, config: &mut KafkaConfig, key: &str, value: &str) -> Result<(), String> {
        let mut single = ClientConfig::new();
        single.set(key, value);
        single.create_native_config().map_err(|e| e.to_string())?;
        config.inner.set(key, value);
        Ok(())
    }

    fn set_delivery_callback(&mut self, config: &mut KafkaConfig, callback: DeliveryCallback) {
        config.delivery = Some(callback);
    }

    fn create_producer(&mut self, config: KafkaConfig) -> Result<KafkaProducer, String> {
        let logger: SharedLogger = Arc::new(RwLock::new(None));
        let context = RelayContext {
            delivery: config.delivery,
            logger: logger.clone(),
        };
        let inner = config
            .inner
            .create_with_context::<_, BaseProducer<RelayContext>>(context)
            .map_err(|e| e.to_string())?;
        Ok(KafkaProducer { inner, logger })
    }

    fn set_logger(&mut self, producer: &mut KafkaProducer, logger: LogCallback, level: log::LevelFilter) {
        let mut slot = match producer.logger.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some((logger, level));
        drop(slot);
        // SAFETY: the native handle stays valid while `producer` is alive
        unsafe {
            rdkafka_sys::rd_kafka_set_log_level(
                producer.inner.client().native_ptr(),
                native_log_level(level),
            );
        }
    }

    fn add_brokers(&mut self, producer: &mut KafkaProducer, brokers: &str) -> usize {
        let Ok(list) = CString::new(brokers) else {
            return 0;
        };
        // SAFETY: the native handle stays valid while `producer` is alive and
        // librdkafka copies the broker list before returning.
        let added = unsafe {
            rdkafka_sys::rd_kafka_brokers_add(producer.inner.client().native_ptr(), list.as_ptr())
        };
        usize::try_from(added).unwrap_or(0)
    }

    fn create_topic(
        &mut self,
        producer: &mut KafkaProducer,
        name: &str,
        config: KafkaTopicConfig,
    ) -> Result<KafkaTopic, String> {
        if name.is_empty() {
            return Err("topic name is empty".to_string());
        }
        let c_name = CString::new(name).map_err(|e| format!("invalid topic name '{}': {}", name, e))?;
        // SAFETY: librdkafka takes ownership of the topic configuration
        // whether or not the call succeeds.
        let native = unsafe {
            rdkafka_sys::rd_kafka_topic_new(
                producer.inner.client().native_ptr(),
                c_name.as_ptr(),
                config.into_raw(),
            )
        };
        match NonNull::new(native) {
            Some(native) => Ok(KafkaTopic {
                name: name.to_string(),
                native,
            }),
            None => Err(format!("topic '{}': {}", name, last_error())),
        }
    }

    fn produce(
        &mut self,
        producer: &mut KafkaProducer,
        topic: &KafkaTopic,
        partition: Option<i32>,
        payload: &[u8],
    ) -> Result<(), ProduceError> {
        let mut record = BaseRecord::<(), [u8]>::to(&topic.name).payload(payload);
        if let Some(partition) = partition {
            record = record.partition(partition);
        }
        producer.inner.send(record).map_err(|(err, _)| classify(err))
    }

    fn poll(&mut self, producer: &mut KafkaProducer, timeout: Duration) {
        producer.inner.poll(timeout);
    }

    fn flush(&mut self, producer: &mut KafkaProducer, timeout: Duration) -> Result<(), String> {
        producer.inner.flush(timeout).map_err(|e| e.to_string())
    }

    fn destroy_topic(&mut self, topic: KafkaTopic) {
        drop(topic);
    }

    fn destroy_producer(&mut self, producer: KafkaProducer) {
        drop(producer);
    }
}
