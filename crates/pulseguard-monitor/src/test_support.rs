//! Shared fakes for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::delivery::{DeliveryReceipt, DeliveryRequest, NotificationSink};
use crate::error::DeliveryError;

/// Sink that records requests and answers with a fixed result.
pub struct RecordingSink {
    pub requests: Mutex<Vec<DeliveryRequest>>,
    pub calls: AtomicUsize,
    channel: Mutex<String>,
    failure: Option<DeliveryError>,
    delay: Duration,
}

impl RecordingSink {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::build(None, Duration::ZERO))
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(None, delay))
    }

    pub fn failing(error: DeliveryError) -> Arc<Self> {
        Arc::new(Self::build(Some(error), Duration::ZERO))
    }

    fn build(failure: Option<DeliveryError>, delay: Duration) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            channel: Mutex::new("wechat".to_string()),
            failure,
            delay,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn channel(&self) -> String {
        self.channel.lock().clone()
    }

    fn set_channel(&self, channel: &str) -> Result<(), DeliveryError> {
        *self.channel.lock() = channel.to_string();
        Ok(())
    }

    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt, DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(DeliveryReceipt {
                attempts: 1,
                message_id: None,
                delivered_at: Utc::now(),
            }),
        }
    }
}
