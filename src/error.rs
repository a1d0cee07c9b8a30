//! Error taxonomy for the audit pipeline
//!
//! Initialization errors are fatal and carry a distinct exit status per
//! failing stage. Publish rejections and resolver degradation are
//! recoverable and never abort the relay.

use std::fmt;

use crate::broker::ProduceError;

/// Lifecycle stage that owns a broker resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Producer,
    Topic,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Producer => write!(f, "producer"),
            Stage::Topic => write!(f, "topic"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("configuration key '{key}' rejected by broker client: {message}")]
    ConfigValidation { key: String, message: String },

    #[error("failed to create {stage} handle: {message}")]
    ResourceCreation { stage: Stage, message: String },

    #[error("broker list '{brokers}' was not accepted by the producer")]
    ConnectivityAcceptance { brokers: String },

    #[error("publish rejected: {0}")]
    PublishRejected(ProduceError),

    #[error("command line of pid {pid} unavailable: {source}")]
    ResolverDegraded {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

impl AuditError {
    /// Process exit status reported when this error aborts startup
    pub fn exit_code(&self) -> i32 {
        match self {
            AuditError::Settings(_) => 2,
            AuditError::ConfigValidation { .. } => 3,
            AuditError::ResourceCreation { stage: Stage::Producer, .. } => 4,
            AuditError::ConnectivityAcceptance { .. } => 5,
            AuditError::ResourceCreation { stage: Stage::Topic, .. } => 6,
            AuditError::PublishRejected(_) => 7,
            AuditError::ResolverDegraded { .. } => 0,
        }
    }

    /// Exit status for any error reaching `main`; 1 when no stage is known
    pub fn exit_code_of(err: &anyhow::Error) -> i32 {
        err.downcast_ref::<AuditError>()
            .map_or(1, AuditError::exit_code)
    }

    /// Whether this error must abort initialization
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AuditError::PublishRejected(_) | AuditError::ResolverDegraded { .. }
        )
    }
}
