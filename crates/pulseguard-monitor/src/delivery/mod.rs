//! Outbound notification delivery.

mod pushplus;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entity::EntityId;
use crate::error::DeliveryError;

pub use pushplus::PushPlusClient;

/// One notification to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    pub entity: EntityId,
    /// Recipient override; `None` delivers to the token owner.
    pub target: Option<String>,
    pub title: String,
    pub content: String,
}

/// Proof of a delivery accepted by the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub attempts: u32,
    /// Service-side message id, when the sink returns one.
    pub message_id: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

/// Attempt count and fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}

/// External push sink.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    /// Current delivery channel.
    fn channel(&self) -> String;

    /// Switch the delivery channel for subsequent sends.
    fn set_channel(&self, channel: &str) -> Result<(), DeliveryError>;

    /// Deliver, retrying transient failures. Terminal failures return immediately.
    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt, DeliveryError>;
}
