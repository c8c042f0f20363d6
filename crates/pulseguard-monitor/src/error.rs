//! Monitor errors.

use pulseguard_config::ConfigError;
use thiserror::Error;

/// Engine-level error taxonomy.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Network or timeout failure; the operation may be retried.
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    /// Credential rejected by the push service; retrying will not help.
    #[error("Push credential rejected: {0}")]
    TerminalAuth(String),

    /// Missing or invalid configuration. Monitoring is disabled until a good reload.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed event text. The event is dropped.
    #[error("Cannot parse signal: {0}")]
    SignalParse(String),

    /// The entity is not in the monitored set.
    #[error("Entity is not monitored: {0}")]
    NotMonitored(String),

    /// Local file error (evidence log).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DeliveryError> for MonitorError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Terminal(msg) => MonitorError::TerminalAuth(msg),
            other => MonitorError::TransientIo(other.to_string()),
        }
    }
}

/// Delivery failure after the retry loop has finished.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Rejected in a way retries cannot fix (bad or unbound token).
    #[error("Delivery rejected: {0}")]
    Terminal(String),

    /// Every attempt failed transiently.
    #[error("Delivery failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: String },

    /// Client is missing required settings.
    #[error("Delivery not configured: {0}")]
    NotConfigured(String),
}

impl DeliveryError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryError::Terminal(_) | DeliveryError::NotConfigured(_))
    }
}

/// Administrative command failures.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Sender {0} is not allowed to run this command")]
    Unauthorized(String),

    #[error("Entity {0} is not monitored")]
    UnknownEntity(String),

    #[error("Entity {0} is already monitored")]
    DuplicateEntity(String),

    #[error("Unsupported channel: {0} (supported: wechat, sms, mail, webhook, cp)")]
    InvalidChannel(String),

    #[error("No entity to act on; add one or set basic.primary_entity")]
    NoEntity,

    #[error("No configuration store attached")]
    NoConfigStore,

    #[error(transparent)]
    Monitor(#[from] MonitorError),
}
