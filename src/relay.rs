//! Relay runtime
//!
//! Reads interception-layer notifications as JSON lines, turns each into an
//! audit record and publishes it. A single task owns the producer, so
//! publish calls, periodic delivery polls and shutdown never race.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::MissedTickBehavior;

use crate::broker::BrokerClient;
use crate::error::AuditError;
use crate::logging::{broker_log_bridge, AuditLogger};
use crate::models::{DeliveryResult, InboundEvent, RunSummary};
use crate::process::CommandLineResolver;
use crate::producer::{Producer, ProducerSettings};
use crate::record::{AuditEvent, RecordTemplate};

/// Runtime knobs of the relay loop
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub poll_interval: Duration,
    pub flush_timeout: Duration,
    pub template: RecordTemplate,
    pub resolver: CommandLineResolver,
}

/// Owns the producer and turns notification lines into published records
pub struct Relay<C: BrokerClient> {
    producer: Producer<C>,
    template: RecordTemplate,
    resolver: CommandLineResolver,
    logger: AuditLogger,
    received: u64,
    malformed: u64,
}

impl<C: BrokerClient> Relay<C> {
    pub fn new(producer: Producer<C>, options: &RelayOptions) -> Self {
        let logger = AuditLogger::new(producer.default_topic());
        Self {
            producer,
            template: options.template.clone(),
            resolver: options.resolver.clone(),
            logger,
            received: 0,
            malformed: 0,
        }
    }

    /// Handle one input line. Returns the publish outcome, or `None` when
    /// the line was blank, malformed or rejected.
    pub fn handle_line(&mut self, line: &str) -> Option<DeliveryResult> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        self.received += 1;

        let notification: InboundEvent = match serde_json::from_str(line) {
            Ok(notification) => notification,
            Err(e) => {
                self.malformed += 1;
                log::warn!("skipping malformed notification: {}", e);
                return None;
            }
        };

        let event = AuditEvent::build(notification, &self.resolver, &Local::now());
        let record = event.to_wire(&self.template);

        match self.producer.publish(record.as_bytes()) {
            Ok(result @ DeliveryResult::Enqueued { .. }) => Some(result),
            Ok(result @ DeliveryResult::Dropped { attempts }) => {
                self.logger.log_drop(event.pid(), event.path(), attempts);
                Some(result)
            }
            Err(AuditError::PublishRejected(reason)) => {
                self.logger
                    .log_rejection(event.pid(), event.path(), &reason.to_string());
                None
            }
            Err(other) => {
                self.logger.log_error(&other.to_string(), Some(event.path()));
                None
            }
        }
    }

    pub fn poll(&mut self) {
        self.producer.poll(Duration::ZERO);
    }

    /// Flush and release the producer, then report the run
    pub fn finish(self, flush_timeout: Duration, started: Instant, reason: &str, interrupted: bool) -> RunSummary {
        let stats = self.producer.stats();
        let flushed = self.producer.shutdown(flush_timeout);
        let counters = stats.snapshot();

        let summary = RunSummary {
            received: self.received,
            malformed: self.malformed,
            enqueued: counters.enqueued,
            retried: counters.retried,
            dropped: counters.dropped,
            rejected: counters.rejected,
            delivered: counters.delivered,
            delivery_failed: counters.delivery_failed,
            duration_ms: started.elapsed().as_millis() as u64,
            interrupted: interrupted.then_some(true),
        };
        self.logger.log_shutdown(reason, &summary, flushed);
        summary
    }
}

/// Bring the producer up on `client`, then relay `input` until it ends or
/// `shutdown` resolves. Initialization failures leave nothing running.
pub async fn start<C, R, S>(
    client: C,
    settings: &ProducerSettings,
    input: R,
    options: &RelayOptions,
    shutdown: S,
) -> Result<RunSummary, AuditError>
where
    C: BrokerClient,
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let producer = Producer::initialize(client, settings, broker_log_bridge())?;
    Ok(run(producer, input, options, shutdown).await)
}

/// Drive the relay until the input ends or `shutdown` resolves
pub async fn run<C, R, S>(producer: Producer<C>, input: R, options: &RelayOptions, shutdown: S) -> RunSummary
where
    C: BrokerClient,
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let started = Instant::now();
    let mut relay = Relay::new(producer, options);
    let mut lines = input.lines();

    let mut ticker = tokio::time::interval(options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let (reason, interrupted) = loop {
        tokio::select! {
            _ = &mut shutdown => break ("received shutdown signal", true),
            _ = ticker.tick() => relay.poll(),
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    relay.handle_line(&line);
                }
                Ok(None) => break ("end of input", false),
                Err(e) => {
                    relay.logger.log_error(&format!("failed to read input: {}", e), None);
                    break ("input error", false);
                }
            },
        }
    };

    relay.finish(options.flush_timeout, started, reason, interrupted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::{MemoryBroker, MemoryBrokerScript};
    use crate::broker::ProduceError;
    use crate::config::BrokerConfig;
    use crate::producer::{ProducerSettings, RetryPolicy};
    use std::sync::Arc;

    fn options(proc_root: &std::path::Path) -> RelayOptions {
        RelayOptions {
            poll_interval: Duration::from_millis(5),
            flush_timeout: Duration::from_millis(50),
            template: RecordTemplate::default(),
            resolver: CommandLineResolver::new().with_proc_root(proc_root),
        }
    }

    fn producer(broker: MemoryBroker) -> Producer<MemoryBroker> {
        let settings = ProducerSettings {
            brokers: "localhost:9092".into(),
            topic: "logs".into(),
            config: BrokerConfig::default(),
            log_level: log::LevelFilter::Off,
            retry: RetryPolicy::new(2, Duration::ZERO, Duration::ZERO),
        };
        Producer::initialize(broker, &settings, Arc::new(|_: log::Level, _: &str, _: &str| {})).unwrap()
    }

    const OPEN: &str = r#"{"pid": 77, "operation": "open", "path": "/etc/passwd", "flags": ["O_RDONLY"]}"#;

    #[test]
    fn test_handle_line_publishes_record() {
        let root = tempfile::tempdir().unwrap();
        let broker = MemoryBroker::default();
        let delivered = broker.delivered();
        let mut relay = Relay::new(producer(broker), &options(root.path()));

        assert_eq!(relay.handle_line(OPEN), Some(DeliveryResult::Enqueued { attempts: 1 }));
        relay.poll();

        let delivered = delivered.lock().unwrap();
        let record: serde_json::Value = serde_json::from_slice(&delivered[0].payload).unwrap();
        assert_eq!(record["path"], "/etc/passwd");
        assert_eq!(record["pid"], 77);
        assert_eq!(record["command"], "");
    }

    #[test]
    fn test_blank_and_malformed_lines() {
        let root = tempfile::tempdir().unwrap();
        let mut relay = Relay::new(producer(MemoryBroker::default()), &options(root.path()));

        assert_eq!(relay.handle_line("   "), None);
        assert_eq!(relay.handle_line("{not json"), None);
        assert_eq!(relay.received, 1);
        assert_eq!(relay.malformed, 1);
    }

    #[test]
    fn test_drop_and_rejection_are_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        let broker = MemoryBroker::new(
            MemoryBrokerScript::default()
                .queue_full(2)
                .produce_outcomes([Err(ProduceError::MessageTooLarge)]),
        );
        let mut relay = Relay::new(producer(broker), &options(root.path()));

        assert_eq!(relay.handle_line(OPEN), Some(DeliveryResult::Dropped { attempts: 2 }));
        assert_eq!(relay.handle_line(OPEN), None);
        assert!(relay.handle_line(OPEN).is_some());

        let summary = relay.finish(Duration::from_millis(10), Instant::now(), "test", false);
        assert_eq!(summary.received, 3);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.enqueued, 1);
        assert_eq!(summary.delivered, 1);
    }

    #[tokio::test]
    async fn test_run_until_end_of_input() {
        let root = tempfile::tempdir().unwrap();
        let broker = MemoryBroker::default();
        let delivered = broker.delivered();
        let input = format!("{}\n\n{}\n", OPEN, OPEN);

        let summary = run(
            producer(broker),
            input.as_bytes(),
            &options(root.path()),
            std::future::pending(),
        )
        .await;

        assert_eq!(summary.received, 2);
        assert_eq!(summary.delivered, 2);
        assert!(summary.interrupted.is_none());
        assert_eq!(delivered.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let root = tempfile::tempdir().unwrap();
        let (_writer, reader) = tokio::io::duplex(64);
        let reader = tokio::io::BufReader::new(reader);

        let summary = run(
            producer(MemoryBroker::default()),
            reader,
            &options(root.path()),
            tokio::time::sleep(Duration::from_millis(20)),
        )
        .await;

        assert_eq!(summary.interrupted, Some(true));
        assert_eq!(summary.received, 0);
    }
}
