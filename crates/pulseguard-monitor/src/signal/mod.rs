//! Liveness signal sources.
//!
//! Every source answers `Healthy`, `Failed(reason)` or `Unknown`. Only `Failed`
//! becomes a [`FailureEvent`]; `Unknown` means the source could not look and is
//! never counted against the entity.

mod passive;
mod probe;
mod status_poll;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

pub use passive::{
    ENTITY_PATTERN, FallbackContext, InboundEvent, PassiveMatch, PassiveTextEvent,
    extract_entity, extract_signal, is_entity_id, scan,
};
pub use probe::{ActiveProbe, HttpSessionProbe, ProbeError, SessionProbe};
pub use status_poll::ExternalStatusPoll;

/// Result of sampling one source for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    Healthy,
    Failed(String),
    Unknown,
}

impl SignalOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SignalOutcome::Failed(_))
    }
}

impl std::fmt::Display for SignalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalOutcome::Healthy => write!(f, "healthy"),
            SignalOutcome::Failed(reason) => write!(f, "failed ({})", reason),
            SignalOutcome::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which source produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ActiveProbe,
    PassiveText,
    EvidenceReplay,
    StatusPoll,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::ActiveProbe => write!(f, "probe"),
            SignalKind::PassiveText => write!(f, "passive"),
            SignalKind::EvidenceReplay => write!(f, "replay"),
            SignalKind::StatusPoll => write!(f, "status"),
        }
    }
}

/// What kind of failure the evidence points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    HeartbeatFailed,
    LoggedOut,
    FetchFailed,
    Offline,
    ProbeFailed,
    ServiceDown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::HeartbeatFailed => write!(f, "heartbeat failed"),
            FailureKind::LoggedOut => write!(f, "logged out"),
            FailureKind::FetchFailed => write!(f, "cannot fetch messages"),
            FailureKind::Offline => write!(f, "offline"),
            FailureKind::ProbeFailed => write!(f, "probe failed"),
            FailureKind::ServiceDown => write!(f, "service down"),
        }
    }
}

/// One failure observation for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEvent {
    pub entity: EntityId,
    pub kind: FailureKind,
    pub source: SignalKind,
    pub at: DateTime<Utc>,
    pub reason: String,
}

impl FailureEvent {
    pub fn new(
        entity: EntityId,
        kind: FailureKind,
        source: SignalKind,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity,
            kind,
            source,
            at,
            reason: kind.to_string(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// A pull-based liveness source.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Sample liveness of `entity`.
    async fn sample(&self, entity: &EntityId) -> SignalOutcome;
}
