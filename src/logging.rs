//! Structured logging for the relay
//!
//! `log` facade with an `env_logger` backend on stderr. Lifecycle and
//! accounting events are emitted as one JSON object per line so downstream
//! collectors can parse them.

use std::sync::Arc;

use serde_json::json;

use crate::broker::LogCallback;
use crate::constants::BROKER_LOG_TARGET;
use crate::models::RunSummary;

/// Install the global logger. `verbosity` counts `-v` flags; `RUST_LOG`
/// takes precedence when set.
pub fn init(verbosity: u8, quiet: bool) {
    let default_level = match (quiet, verbosity) {
        (true, _) => log::LevelFilter::Error,
        (false, 0) => log::LevelFilter::Warn,
        (false, 1) => log::LevelFilter::Info,
        (false, 2) => log::LevelFilter::Debug,
        (false, _) => log::LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(default_level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.target(env_logger::Target::Stderr);
    // A logger may already be installed (tests, embedding applications)
    let _ = builder.try_init();
}

/// Logger callback handed to the broker client
pub fn broker_log_bridge() -> LogCallback {
    Arc::new(|level: log::Level, facility: &str, message: &str| {
        log::log!(target: BROKER_LOG_TARGET, level, "[{}] {}", facility, message);
    })
}

/// Emits relay lifecycle events as structured log lines
#[derive(Debug, Clone)]
pub struct AuditLogger {
    topic: String,
}

impl AuditLogger {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
        }
    }

    pub fn log_startup(&self, brokers: &str, config_path: Option<&std::path::Path>, dry_run: bool) {
        let message = json!({
            "event": "startup",
            "pid": std::process::id(),
            "brokers": brokers,
            "topic": self.topic,
            "config_path": config_path.map(|p| p.display().to_string()),
            "dry_run": dry_run,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        log::info!("Relay started | {}", message);
    }

    pub fn log_shutdown(&self, reason: &str, summary: &RunSummary, flushed: bool) {
        let message = json!({
            "event": "shutdown",
            "reason": reason,
            "flushed": flushed,
            "enqueued": summary.enqueued,
            "dropped": summary.dropped,
            "rejected": summary.rejected,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if flushed {
            log::info!("Relay stopped | {}", message);
        } else {
            log::warn!("Relay stopped with undelivered records | {}", message);
        }
    }

    pub fn log_drop(&self, pid: u32, path: &str, attempts: u32) {
        let message = json!({
            "event": "record_dropped",
            "pid": pid,
            "path": path,
            "topic": self.topic,
            "attempts": attempts,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        log::warn!("Record dropped after retries | {}", message);
    }

    pub fn log_rejection(&self, pid: u32, path: &str, reason: &str) {
        let message = json!({
            "event": "record_rejected",
            "pid": pid,
            "path": path,
            "topic": self.topic,
            "reason": reason,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        log::error!("Record rejected | {}", message);
    }

    pub fn log_error(&self, error_message: &str, context: Option<&str>) {
        let message = json!({
            "event": "error",
            "message": error_message,
            "context": context,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        log::error!("{} | {}", error_message, message);
    }
}
