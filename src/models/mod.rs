//! Data models module
//!
//! Defines core data structures:
//! - InboundEvent: notification emitted by the interception layer
//! - DeliveryResult: synchronous outcome of a publish call
//! - RunSummary: aggregated relay statistics

use serde::{Deserialize, Serialize};

/// One filesystem access as reported by the interception layer.
/// The pid may reference a process that has already exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub pid: u32,
    pub operation: String,
    pub path: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

/// Synchronous outcome of a publish call. Broker acknowledgment arrives
/// later through the delivery callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Accepted into the local queue after `attempts` produce calls
    Enqueued { attempts: u32 },
    /// Every attempt hit a transient rejection; the record was counted as dropped
    Dropped { attempts: u32 },
}

impl DeliveryResult {
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryResult::Enqueued { attempts } | DeliveryResult::Dropped { attempts } => *attempts,
        }
    }

    pub fn is_enqueued(&self) -> bool {
        matches!(self, DeliveryResult::Enqueued { .. })
    }
}

/// Summary statistics for one relay run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Notification lines read from the input
    pub received: u64,
    /// Lines that could not be parsed as notifications
    pub malformed: u64,
    /// Records accepted into the producer queue
    pub enqueued: u64,
    /// Produce calls repeated after a transient rejection
    pub retried: u64,
    /// Records given up after exhausting retries
    pub dropped: u64,
    /// Records refused with a non-transient error
    pub rejected: u64,
    /// Broker acknowledgments received
    pub delivered: u64,
    /// Broker-side delivery failures
    pub delivery_failed: u64,
    /// Duration of the run in milliseconds
    pub duration_ms: u64,
    /// Whether the run was stopped by a signal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
}
