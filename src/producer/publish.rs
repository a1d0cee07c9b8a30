//! Publish executor
//!
//! Enqueues one encoded record, retrying transient rejections with a
//! bounded exponential backoff. The backoff is spent polling the producer so
//! the local queue can drain. Exhausted retries become a counted drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::broker::{BrokerClient, DeliveryReport, PARTITION_UNASSIGNED};
use crate::constants::{DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS};
use crate::error::AuditError;
use crate::models::DeliveryResult;

/// Bounded retry policy for transient produce rejections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        )
    }
}

impl RetryPolicy {
    /// `max_attempts` counts every produce call, including the first; at least one is made
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before attempt `attempt + 1`, doubling from the initial backoff
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Counters shared between the executor and the delivery callback
#[derive(Debug, Default)]
pub struct PublishStats {
    enqueued: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    delivered: AtomicU64,
    delivery_failed: AtomicU64,
}

/// Point-in-time copy of [`PublishStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub retried: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub delivery_failed: u64,
}

impl PublishStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            delivery_failed: self.delivery_failed.load(Ordering::Relaxed),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Account for one broker acknowledgment
    pub fn record_delivery(&self, report: &DeliveryReport) {
        if report.is_success() {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.delivery_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Enqueue `payload` on `topic`, leaving partition choice to the broker
pub fn publish<C: BrokerClient>(
    client: &mut C,
    producer: &mut C::Producer,
    topic: &C::Topic,
    payload: &[u8],
    policy: &RetryPolicy,
    stats: &PublishStats,
) -> Result<DeliveryResult, AuditError> {
    for attempt in 1..=policy.max_attempts {
        match client.produce(producer, topic, PARTITION_UNASSIGNED, payload) {
            Ok(()) => {
                stats.enqueued.fetch_add(1, Ordering::Relaxed);
                return Ok(DeliveryResult::Enqueued { attempts: attempt });
            }
            Err(err) if err.is_transient() => {
                if attempt == policy.max_attempts {
                    break;
                }
                stats.retried.fetch_add(1, Ordering::Relaxed);
                client.poll(producer, policy.backoff(attempt));
            }
            Err(err) => {
                stats.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(AuditError::PublishRejected(err));
            }
        }
    }

    stats.dropped.fetch_add(1, Ordering::Relaxed);
    Ok(DeliveryResult::Dropped {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::{BrokerCall, MemoryBroker, MemoryBrokerScript, MemoryTopicConfig};
    use crate::broker::ProduceError;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    fn run(script: MemoryBrokerScript, policy: RetryPolicy) -> (Result<DeliveryResult, AuditError>, PublishStats, Vec<BrokerCall>) {
        let mut broker = MemoryBroker::new(script);
        let journal = broker.journal();
        let config = broker.new_config();
        let mut producer = broker.create_producer(config).unwrap();
        let topic = broker
            .create_topic(&mut producer, "logs", MemoryTopicConfig)
            .unwrap();
        let stats = PublishStats::default();

        let result = publish(&mut broker, &mut producer, &topic, b"record", &policy, &stats);
        let calls = journal.lock().unwrap().clone();
        (result, stats, calls)
    }

    fn produce_calls(calls: &[BrokerCall]) -> usize {
        calls
            .iter()
            .filter(|c| matches!(c, BrokerCall::Produce { .. }))
            .count()
    }

    // ==================== RetryPolicy tests ====================

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
        assert_eq!(policy.backoff(4), Duration::from_millis(50));
        assert_eq!(policy.backoff(40), Duration::from_millis(50));
    }

    #[test]
    fn test_policy_makes_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts(), 1);
    }

    // ==================== publish() tests ====================

    #[test]
    fn test_first_attempt_success() {
        let (result, stats, calls) = run(MemoryBrokerScript::default(), policy(3));

        assert_eq!(result.unwrap(), DeliveryResult::Enqueued { attempts: 1 });
        assert_eq!(stats.snapshot().enqueued, 1);
        assert_eq!(produce_calls(&calls), 1);
        assert!(calls.contains(&BrokerCall::Produce {
            topic: "logs".to_string(),
            partition: None,
            len: 6,
        }));
    }

    #[test]
    fn test_transient_rejection_then_success() {
        let (result, stats, calls) = run(MemoryBrokerScript::default().queue_full(2), policy(5));

        assert_eq!(result.unwrap(), DeliveryResult::Enqueued { attempts: 3 });
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.retried, 2);
        assert_eq!(snapshot.dropped, 0);
        assert_eq!(produce_calls(&calls), 3);
    }

    #[test]
    fn test_exhausted_retries_record_exactly_one_drop() {
        let (result, stats, calls) = run(MemoryBrokerScript::default().queue_full(10), policy(4));

        assert_eq!(result.unwrap(), DeliveryResult::Dropped { attempts: 4 });
        assert_eq!(produce_calls(&calls), 4);
        assert_eq!(stats.dropped(), 1);
        assert_eq!(stats.snapshot().enqueued, 0);
    }

    #[test]
    fn test_backoff_is_spent_polling() {
        let (_, _, calls) = run(MemoryBrokerScript::default().queue_full(10), policy(3));
        let polls = calls.iter().filter(|c| **c == BrokerCall::Poll).count();
        assert_eq!(polls, 2);
    }

    #[test]
    fn test_non_transient_rejection_is_not_retried() {
        let (result, stats, calls) = run(
            MemoryBrokerScript::default().produce_outcomes([Err(ProduceError::MessageTooLarge)]),
            policy(5),
        );

        match result {
            Err(AuditError::PublishRejected(ProduceError::MessageTooLarge)) => {}
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(produce_calls(&calls), 1);
        assert_eq!(stats.snapshot().rejected, 1);
        assert_eq!(stats.dropped(), 0);
    }

    #[test]
    fn test_delivery_reports_are_counted() {
        let stats = PublishStats::default();
        let ok = DeliveryReport {
            topic: "logs".into(),
            partition: 0,
            offset: Some(1),
            error: None,
        };
        let failed = DeliveryReport {
            error: Some("Message timed out".into()),
            offset: None,
            ..ok.clone()
        };

        stats.record_delivery(&ok);
        stats.record_delivery(&failed);
        stats.record_delivery(&ok);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.delivered, 2);
        assert_eq!(snapshot.delivery_failed, 1);
    }
}
