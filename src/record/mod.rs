//! Audit record construction
//!
//! Turns an interception-layer notification into the immutable
//! [`AuditEvent`] and renders it as the outbound wire record.

pub mod encoder;

use chrono::{DateTime, Local};
use serde_json::Value;

use crate::constants::RECORD_VERSION;
use crate::models::InboundEvent;
use crate::process::CommandLineResolver;
use encoder::{container_string, iso8601_timestamp};

/// Static parts stamped into every record
#[derive(Debug, Clone)]
pub struct RecordTemplate {
    version: String,
    /// Flattened key/value pairs: `[k0, v0, k1, v1, ...]`
    fields: Vec<String>,
    tags: Vec<String>,
}

impl Default for RecordTemplate {
    fn default() -> Self {
        Self {
            version: RECORD_VERSION.to_string(),
            fields: Vec::new(),
            tags: Vec::new(),
        }
    }
}

impl RecordTemplate {
    pub fn new<K, V>(version: &str, fields: impl IntoIterator<Item = (K, V)>, tags: Vec<String>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields: Vec<String> = fields
            .into_iter()
            .flat_map(|(k, v)| [k.into(), v.into()])
            .collect();
        Self {
            version: version.to_string(),
            fields,
            tags,
        }
    }
}

/// One filesystem access enriched with process context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pid: u32,
    uid: Option<u32>,
    gid: Option<u32>,
    operation: String,
    path: String,
    flags: Vec<String>,
    timestamp: String,
    command: String,
}

impl AuditEvent {
    /// Attach the encoded command line of `notification.pid` and a timestamp
    pub fn build(notification: InboundEvent, resolver: &CommandLineResolver, now: &DateTime<Local>) -> Self {
        let command = resolver.resolve(notification.pid);
        Self {
            pid: notification.pid,
            uid: notification.uid,
            gid: notification.gid,
            operation: notification.operation,
            path: notification.path,
            flags: notification.flags,
            timestamp: iso8601_timestamp(now),
            command,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Base64 command line of the accessing process
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Render the outbound record
    pub fn to_wire(&self, template: &RecordTemplate) -> String {
        let mut out = String::with_capacity(256 + self.command.len());
        out.push_str("{\"path\": ");
        out.push_str(&Value::String(self.path.clone()).to_string());
        out.push_str(&format!(", \"pid\": {}", self.pid));
        if let Some(uid) = self.uid {
            out.push_str(&format!(", \"uid\": {}", uid));
        }
        if let Some(gid) = self.gid {
            out.push_str(&format!(", \"gid\": {}", gid));
        }
        out.push_str(", \"operation\": ");
        out.push_str(&Value::String(self.operation.clone()).to_string());
        out.push_str(", \"flags\": ");
        out.push_str(&container_string(Some(&self.flags[..]), '[', ']', ',', ','));
        out.push_str(&format!(
            ", \"command\": \"{}\", \"@timestamp\": \"{}\", \"@version\": ",
            self.command, self.timestamp
        ));
        out.push_str(&Value::String(template.version.clone()).to_string());
        out.push_str(", \"@fields\": ");
        out.push_str(&container_string(Some(&template.fields[..]), '{', '}', ':', ','));
        out.push_str(", \"@tags\": ");
        out.push_str(&container_string(Some(&template.tags[..]), '[', ']', ',', ','));
        out.push('}');
        out
    }
}
