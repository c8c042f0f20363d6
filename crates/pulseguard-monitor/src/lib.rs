//! # PulseGuard Monitor
//!
//! Liveness detection and notification engine for a long-lived chat-bot session.
//!
//! ## Pipeline
//!
//! - Signal sources: active heartbeat probe, passive text scraping, status polling
//! - Failure aggregation over a trailing window with a threshold
//! - Notification gate with a minimum resend interval
//! - PushPlus delivery with bounded retry

pub mod admin;
pub mod aggregator;
pub mod delivery;
pub mod entity;
pub mod error;
pub mod evidence;
pub mod gate;
pub mod message;
pub mod notifier;
pub mod registry;
pub mod service;
pub mod settings;
pub mod signal;

#[cfg(test)]
mod test_support;

pub use admin::{AdminCommand, AdminReply, AdminService, Authorizer, StaticAdmins, TemplateKind};
pub use aggregator::{FailureAggregator, FailureRecord};
pub use delivery::{
    DeliveryReceipt, DeliveryRequest, NotificationSink, PushPlusClient, RetryPolicy,
};
pub use entity::{EntityId, MonitoredEntity};
pub use error::{AdminError, DeliveryError, MonitorError};
pub use evidence::{EvidenceEntry, EvidenceLog};
pub use gate::{NotificationGate, NotificationState};
pub use message::{MessageRenderer, RenderedMessage};
pub use notifier::{NotifyOutcome, Notifier};
pub use registry::{EntitySnapshot, FailureOutcome, MonitorRegistry};
pub use service::{Diagnostic, MonitorService, SinkFactory, StatusReport, pushplus_sink_factory};
pub use settings::MonitorSettings;
pub use signal::{
    ActiveProbe, ExternalStatusPoll, FailureEvent, FailureKind, HttpSessionProbe, InboundEvent,
    SessionProbe, SignalKind, SignalOutcome, SignalSource,
};
