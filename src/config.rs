//! Configuration management
//!
//! Handles TOML configuration parsing, discovery, validation and command-line
//! overrides. Broker settings keep their file order because the first
//! rejected key is the one reported.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    APP_NAME, CONFIG_SEARCH_PATTERNS, DEFAULT_BROKERS, DEFAULT_FLUSH_TIMEOUT_MS,
    DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_TOPIC, RECORD_VERSION,
};
use crate::error::AuditError;
use crate::producer::{ProducerSettings, RetryPolicy};
use crate::record::RecordTemplate;

/// Ordered mapping of broker configuration key to string value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerConfig {
    entries: Vec<(String, String)>,
}

impl BrokerConfig {
    /// Set `key`, keeping its original position if already present
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfiguration {
    pub broker: BrokerSection,
    pub publish: PublishSection,
    pub record: RecordSection,
}

/// Producer connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerSection {
    /// Comma-separated `host:port` list
    pub brokers: String,
    /// Topic receiving audit records
    pub topic: String,
    /// Level of broker client log lines forwarded to our logger
    pub log_level: String,
    /// Entries applied verbatim to the broker client configuration
    pub settings: toml::Table,
}

/// Publish retry and shutdown settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishSection {
    /// Produce calls per record, including the first (>= 1)
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Interval between delivery-report polls
    pub poll_interval_ms: u64,
    /// Upper bound on the shutdown flush
    pub flush_timeout_ms: u64,
}

/// Static values stamped into each record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecordSection {
    pub version: String,
    /// Extra key/value pairs rendered under `@fields`
    pub fields: toml::Table,
    /// Labels rendered under `@tags`
    pub tags: Vec<String>,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            brokers: DEFAULT_BROKERS.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            log_level: "warn".to_string(),
            settings: toml::Table::new(),
        }
    }
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
        }
    }
}

impl Default for RecordSection {
    fn default() -> Self {
        Self {
            version: RECORD_VERSION.to_string(),
            fields: toml::Table::new(),
            tags: Vec::new(),
        }
    }
}

/// Values given on the command line, applied on top of the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub brokers: Option<String>,
    pub topic: Option<String>,
    pub settings: Vec<(String, String)>,
    pub max_attempts: Option<u32>,
}

fn scalar_to_string(name: &str, value: &toml::Value) -> Result<String, AuditError> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        _ => Err(AuditError::Settings(format!(
            "'{}' must be a string, number or boolean",
            name
        ))),
    }
}

/// Parse a `key=value` command-line pair
pub fn parse_setting(raw: &str) -> Result<(String, String), AuditError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(AuditError::Settings(format!(
            "expected key=value, got '{}'",
            raw
        ))),
    }
}

impl AuditConfiguration {
    /// Load and validate a TOML configuration file
    pub fn load_from_file(path: &Path) -> Result<Self, AuditError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuditError::Settings(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            AuditError::Settings(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// First configuration file found in the search locations
    pub fn discover() -> Option<PathBuf> {
        let mut patterns: Vec<String> = CONFIG_SEARCH_PATTERNS.iter().map(|p| p.to_string()).collect();
        if let Some(dir) = dirs::config_dir() {
            patterns.push(dir.join(APP_NAME).join("*.toml").to_string_lossy().into_owned());
        }
        patterns.iter().find_map(|pattern| first_match(pattern))
    }

    /// Load `path`, or the discovered file, or defaults
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>), AuditError> {
        let source = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };
        match source {
            Some(path) => Ok((Self::load_from_file(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<(), AuditError> {
        if let Some(brokers) = &overrides.brokers {
            self.broker.brokers = brokers.clone();
        }
        if let Some(topic) = &overrides.topic {
            self.broker.topic = topic.clone();
        }
        for (key, value) in &overrides.settings {
            self.broker
                .settings
                .insert(key.clone(), toml::Value::String(value.clone()));
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.publish.max_attempts = max_attempts;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        if self.broker.topic.trim().is_empty() {
            return Err(AuditError::Settings("broker.topic must not be empty".into()));
        }
        if self.broker.brokers.trim().is_empty() {
            return Err(AuditError::Settings("broker.brokers must not be empty".into()));
        }
        if self.publish.max_attempts == 0 {
            return Err(AuditError::Settings("publish.max_attempts must be at least 1".into()));
        }
        if self.publish.initial_backoff_ms > self.publish.max_backoff_ms {
            return Err(AuditError::Settings(
                "publish.initial_backoff_ms must not exceed publish.max_backoff_ms".into(),
            ));
        }
        if self.publish.poll_interval_ms == 0 {
            return Err(AuditError::Settings("publish.poll_interval_ms must be positive".into()));
        }
        self.log_level()?;
        self.broker_config()?;
        self.record_template()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<log::LevelFilter, AuditError> {
        log::LevelFilter::from_str(&self.broker.log_level).map_err(|_| {
            AuditError::Settings(format!("unknown log level '{}'", self.broker.log_level))
        })
    }

    pub fn broker_config(&self) -> Result<BrokerConfig, AuditError> {
        let mut config = BrokerConfig::default();
        for (key, value) in &self.broker.settings {
            config.insert(key.clone(), scalar_to_string(key, value)?);
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.publish.max_attempts,
            Duration::from_millis(self.publish.initial_backoff_ms),
            Duration::from_millis(self.publish.max_backoff_ms),
        )
    }

    pub fn producer_settings(&self) -> Result<ProducerSettings, AuditError> {
        Ok(ProducerSettings {
            brokers: self.broker.brokers.clone(),
            topic: self.broker.topic.clone(),
            config: self.broker_config()?,
            log_level: self.log_level()?,
            retry: self.retry_policy(),
        })
    }

    pub fn record_template(&self) -> Result<RecordTemplate, AuditError> {
        let fields = self
            .record
            .fields
            .iter()
            .map(|(k, v)| scalar_to_string(k, v).map(|v| (k.clone(), v)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RecordTemplate::new(&self.record.version, fields, self.record.tags.clone()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.publish.poll_interval_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.publish.flush_timeout_ms)
    }
}

fn first_match(pattern: &str) -> Option<PathBuf> {
    let paths = glob::glob(pattern).ok()?;
    let mut files: Vec<PathBuf> = paths.filter_map(Result::ok).filter(|p| p.is_file()).collect();
    files.sort();
    files.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AuditConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.broker.topic, DEFAULT_TOPIC);
        assert_eq!(config.retry_policy().max_attempts(), DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_full_file_parsing() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "relay.toml",
            r#"
[broker]
brokers = "k1:9092,k2:9092"
topic = "fs-audit"
log_level = "debug"

[broker.settings]
"queue.buffering.max.messages" = 50000
"compression.codec" = "snappy"
"enable.idempotence" = true

[publish]
max_attempts = 3
initial_backoff_ms = 5
max_backoff_ms = 20

[record]
version = "2"
tags = ["prod"]

[record.fields]
host = "web-1"
"#,
        );

        let config = AuditConfiguration::load_from_file(&path).unwrap();
        let settings = config.producer_settings().unwrap();

        assert_eq!(settings.brokers, "k1:9092,k2:9092");
        assert_eq!(settings.topic, "fs-audit");
        assert_eq!(settings.log_level, log::LevelFilter::Debug);
        assert_eq!(settings.retry.max_attempts(), 3);
        let keys: Vec<&str> = settings.config.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            ["queue.buffering.max.messages", "compression.codec", "enable.idempotence"]
        );
        assert_eq!(settings.config.get("queue.buffering.max.messages"), Some("50000"));
        assert_eq!(settings.config.get("enable.idempotence"), Some("true"));
    }

    #[test]
    fn test_table_setting_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "bad.toml",
            "[broker.settings]\nnested = { a = 1 }\n",
        );

        match AuditConfiguration::load_from_file(&path) {
            Err(AuditError::Settings(message)) => assert!(message.contains("nested")),
            other => panic!("expected settings error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "bad.toml", "[mount]\ndirectories = [\"/var\"]\n");
        assert!(AuditConfiguration::load_from_file(&path).is_err());
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "bad.toml", "[publish]\nmax_attempts = 0\n");

        let err = AuditConfiguration::load_from_file(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let mut config = AuditConfiguration::default();
        config.broker.log_level = "chatty".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = AuditConfiguration::default();
        config
            .broker
            .settings
            .insert("client.id".into(), toml::Value::String("file".into()));

        config
            .apply_overrides(&Overrides {
                brokers: Some("b:1".into()),
                topic: Some("other".into()),
                settings: vec![
                    ("client.id".into(), "cli".into()),
                    ("acks".into(), "all".into()),
                ],
                max_attempts: Some(9),
            })
            .unwrap();

        let broker_config = config.broker_config().unwrap();
        assert_eq!(config.broker.brokers, "b:1");
        assert_eq!(config.broker.topic, "other");
        assert_eq!(broker_config.get("client.id"), Some("cli"));
        assert_eq!(broker_config.iter().last(), Some(("acks", "all")));
        assert_eq!(config.publish.max_attempts, 9);
    }

    #[test]
    fn test_record_template_from_fields() {
        let mut config = AuditConfiguration::default();
        config.record.fields.insert("zone".into(), toml::Value::String("eu".into()));
        config.record.fields.insert("rack".into(), toml::Value::Integer(4));
        assert!(config.record_template().is_ok());
    }

    #[test]
    fn test_parse_setting() {
        assert_eq!(
            parse_setting("acks=all").unwrap(),
            ("acks".to_string(), "all".to_string())
        );
        assert_eq!(
            parse_setting("sasl.password=a=b").unwrap(),
            ("sasl.password".to_string(), "a=b".to_string())
        );
        assert!(parse_setting("novalue").is_err());
        assert!(parse_setting("=x").is_err());
    }

    #[test]
    fn test_broker_config_insert_keeps_position() {
        let mut config = BrokerConfig::default();
        config.insert("a", "1");
        config.insert("b", "2");
        config.insert("a", "3");

        let entries: Vec<_> = config.iter().collect();
        assert_eq!(entries, [("a", "3"), ("b", "2")]);
        assert_eq!(config.len(), 2);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "explicit.toml", "[broker]\ntopic = \"explicit\"\n");

        let (config, source) = AuditConfiguration::load(Some(&path)).unwrap();
        assert_eq!(config.broker.topic, "explicit");
        assert_eq!(source, Some(path));
    }
}
