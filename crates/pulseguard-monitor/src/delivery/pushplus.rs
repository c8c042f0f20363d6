//! PushPlus delivery client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use pulseguard_config::{PushPlusConfig, VALID_CHANNELS};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{DeliveryReceipt, DeliveryRequest, NotificationSink, RetryPolicy};
use crate::error::DeliveryError;

#[cfg(test)]
#[path = "pushplus_tests.rs"]
mod tests;

/// Words that, next to "token" in an error message, mean the credential is bad.
const INVALID_TOKEN_MARKERS: &[&str] = &["用户", "invalid", "无效", "错误", "不存在", "expired"];

#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    token: &'a str,
    title: &'a str,
    content: &'a str,
    template: &'a str,
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Outcome of a single HTTP attempt.
#[derive(Debug)]
enum Attempt {
    Delivered(Option<String>),
    Terminal(String),
    Transient(String),
}

/// PushPlus `send` API client with bounded retry.
pub struct PushPlusClient {
    token: String,
    template: String,
    topic: Option<String>,
    endpoint: String,
    channel: RwLock<String>,
    retry: RetryPolicy,
    client: Client,
}

impl PushPlusClient {
    pub fn new(
        config: &PushPlusConfig,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            token: config.token.clone(),
            template: config.template.clone(),
            topic: config.topic.clone().filter(|t| !t.is_empty()),
            endpoint: config.endpoint.clone(),
            channel: RwLock::new(config.channel.clone()),
            retry,
            client,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn attempt(&self, request: &DeliveryRequest, channel: &str) -> Attempt {
        // Per-recipient delivery only exists on the wechat channel.
        let to = request
            .target
            .as_deref()
            .filter(|t| !t.is_empty() && channel == "wechat");

        let payload = SendPayload {
            token: &self.token,
            title: &request.title,
            content: &request.content,
            template: &self.template,
            channel,
            topic: self.topic.as_deref(),
            to,
        };

        let response = match self.client.post(&self.endpoint).json(&payload).send().await {
            Ok(r) => r,
            Err(e) => return Attempt::Transient(format!("request failed: {}", e)),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return Attempt::Transient(format!("cannot read response: {}", e)),
        };

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Attempt::Terminal(format!("HTTP {}: {}", status, body.trim()));
        }

        classify(status, &body)
    }
}

fn classify(status: StatusCode, body: &str) -> Attempt {
    let parsed: SendResponse = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(_) => {
            return Attempt::Transient(format!(
                "HTTP {} with non-JSON body: {}",
                status,
                body.chars().take(120).collect::<String>()
            ));
        }
    };

    if parsed.code == 200 {
        let message_id = parsed.data.and_then(|d| match d {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        });
        return Attempt::Delivered(message_id);
    }

    if is_token_rejection(&parsed.msg) {
        return Attempt::Terminal(format!("code {}: {}", parsed.code, parsed.msg));
    }

    Attempt::Transient(format!("HTTP {}, code {}: {}", status, parsed.code, parsed.msg))
}

fn is_token_rejection(msg: &str) -> bool {
    let lowered = msg.to_lowercase();
    lowered.contains("token") && INVALID_TOKEN_MARKERS.iter().any(|m| lowered.contains(m))
}

#[async_trait]
impl NotificationSink for PushPlusClient {
    fn name(&self) -> &str {
        "pushplus"
    }

    fn channel(&self) -> String {
        self.channel.read().clone()
    }

    fn set_channel(&self, channel: &str) -> Result<(), DeliveryError> {
        if !VALID_CHANNELS.contains(&channel) {
            return Err(DeliveryError::NotConfigured(format!(
                "unsupported channel '{}'",
                channel
            )));
        }
        *self.channel.write() = channel.to_string();
        info!("PushPlus channel set to {}", channel);
        Ok(())
    }

    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt, DeliveryError> {
        if self.token.is_empty() {
            return Err(DeliveryError::NotConfigured("pushplus.token is empty".to_string()));
        }

        let channel = self.channel();
        let attempts = self.retry.attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            match self.attempt(request, &channel).await {
                Attempt::Delivered(message_id) => {
                    debug!(
                        "Notification for {} delivered on attempt {}",
                        request.entity, attempt
                    );
                    return Ok(DeliveryReceipt {
                        attempts: attempt,
                        message_id,
                        delivered_at: Utc::now(),
                    });
                }
                Attempt::Terminal(reason) => {
                    error!("PushPlus rejected the token: {}", reason);
                    return Err(DeliveryError::Terminal(reason));
                }
                Attempt::Transient(reason) => {
                    if attempt < attempts {
                        warn!(
                            "PushPlus attempt {}/{} failed: {}, retrying in {:?}",
                            attempt, attempts, reason, self.retry.interval
                        );
                        tokio::time::sleep(self.retry.interval).await;
                    }
                    last = reason;
                }
            }
        }

        error!("PushPlus delivery failed after {} attempts", attempts);
        Err(DeliveryError::Exhausted { attempts, last })
    }
}
