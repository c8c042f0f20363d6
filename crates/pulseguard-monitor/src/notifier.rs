//! Notification transactions.
//!
//! A transaction is check-threshold, check-resend, send, record-success. It runs under
//! the entity's notification guard, so at most one is in flight per entity.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::delivery::{DeliveryReceipt, DeliveryRequest, NotificationSink};
use crate::entity::EntityId;
use crate::error::DeliveryError;
use crate::message::MessageRenderer;
use crate::registry::MonitorRegistry;

#[cfg(test)]
#[path = "notifier_tests.rs"]
mod tests;

/// What a notification attempt ended as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent(DeliveryReceipt),
    /// Not over threshold.
    NotDue,
    /// Over threshold but inside the resend interval.
    Suppressed { retry_after: Duration },
    /// Another transaction for this entity holds the guard.
    InFlight,
    NotMonitored,
    Failed(DeliveryError),
}

/// Drives notification transactions against a swappable sink.
pub struct Notifier {
    registry: Arc<MonitorRegistry>,
    sink: RwLock<Arc<dyn NotificationSink>>,
    renderer: RwLock<MessageRenderer>,
}

impl Notifier {
    pub fn new(
        registry: Arc<MonitorRegistry>,
        sink: Arc<dyn NotificationSink>,
        renderer: MessageRenderer,
    ) -> Self {
        Self {
            registry,
            sink: RwLock::new(sink),
            renderer: RwLock::new(renderer),
        }
    }

    pub fn sink(&self) -> Arc<dyn NotificationSink> {
        self.sink.read().clone()
    }

    pub fn set_sink(&self, sink: Arc<dyn NotificationSink>) {
        *self.sink.write() = sink;
    }

    pub fn renderer(&self) -> MessageRenderer {
        self.renderer.read().clone()
    }

    pub fn set_renderer(&self, renderer: MessageRenderer) {
        *self.renderer.write() = renderer;
    }

    /// Notify for `id` if the gate allows it at `now`.
    ///
    /// A concurrent transaction for the same entity makes this return `InFlight`
    /// instead of waiting; the running one already covers the failures seen so far.
    pub async fn notify_if_due(&self, id: &EntityId, now: DateTime<Utc>) -> NotifyOutcome {
        let Some(guard) = self.registry.notify_guard(id.as_str()) else {
            return NotifyOutcome::NotMonitored;
        };
        let Ok(_permit) = guard.try_lock_owned() else {
            return NotifyOutcome::InFlight;
        };

        if !self.registry.should_notify(id.as_str(), now) {
            if !self.registry.is_over_threshold(id.as_str(), now) {
                return NotifyOutcome::NotDue;
            }
            let retry_after = self
                .registry
                .resend_remaining(id.as_str(), now)
                .unwrap_or_default();
            info!(
                "Notification for {} suppressed, next allowed in {}s",
                id,
                retry_after.as_secs()
            );
            return NotifyOutcome::Suppressed { retry_after };
        }

        let Some(entity) = self.registry.entity(id.as_str()) else {
            return NotifyOutcome::NotMonitored;
        };
        let primary = self.registry.primary();
        let message = self.renderer().offline_now(id, primary.as_ref());
        let request = DeliveryRequest {
            entity: entity.id,
            target: entity.target,
            title: message.title,
            content: message.content,
        };

        let sink = self.sink();
        warn!("Sending offline notification for {} via {}", id, sink.name());
        match sink.send(&request).await {
            Ok(receipt) => {
                self.registry.commit_success(id.as_str(), now);
                info!(
                    "Offline notification for {} delivered after {} attempt(s)",
                    id, receipt.attempts
                );
                NotifyOutcome::Sent(receipt)
            }
            Err(e) => {
                error!("Offline notification for {} failed: {}", id, e);
                self.registry.record_delivery_error(id.as_str(), e.to_string());
                NotifyOutcome::Failed(e)
            }
        }
    }

    /// Manual test notification. Bypasses the gate and leaves all state untouched.
    pub async fn send_test(&self, id: &EntityId) -> Result<DeliveryReceipt, DeliveryError> {
        let target = self
            .registry
            .entity(id.as_str())
            .and_then(|e| e.target);
        let primary = self.registry.primary();
        let message = self.renderer().test_now(id, primary.as_ref());
        let request = DeliveryRequest {
            entity: id.clone(),
            target,
            title: message.title,
            content: message.content,
        };

        let receipt = self.sink().send(&request).await?;
        info!("Test notification for {} delivered", id);
        Ok(receipt)
    }
}
