//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;

/// Delivery channels accepted by the push service.
pub const VALID_CHANNELS: [&str; 5] = ["wechat", "sms", "mail", "webhook", "cp"];

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub basic: BasicConfig,

    #[serde(default)]
    pub pushplus: PushPlusConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub evidence: EvidenceConfig,

    #[serde(default)]
    pub message: MessageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Monitored entities. Kept last so it serializes as trailing `[[entities]]` tables.
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

impl Config {
    /// Whether an entity with this id is configured.
    pub fn has_entity(&self, id: &str) -> bool {
        self.entities.iter().any(|e| e.id == id)
    }
}

/// Basic switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicConfig {
    #[serde(default)]
    pub enable: bool,

    #[serde(default)]
    pub debug: bool,

    /// Entity assumed when a passive event carries no identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_entity: Option<String>,

    /// Adopt the first sender that looks like an account id as the primary entity.
    #[serde(default)]
    pub auto_detect_entity: bool,

    /// Senders allowed to run administrative commands.
    #[serde(default)]
    pub admins: Vec<String>,

    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    #[serde(default = "default_bot_name")]
    pub bot_name: String,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            enable: false,
            debug: false,
            primary_entity: None,
            auto_detect_entity: false,
            admins: Vec::new(),
            command_prefix: default_command_prefix(),
            bot_name: default_bot_name(),
        }
    }
}

fn default_command_prefix() -> String {
    "pg_".to_string()
}

fn default_bot_name() -> String {
    "chat bot".to_string()
}

/// PushPlus delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPlusConfig {
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default = "default_template")]
    pub template: String,

    /// Group code; empty or absent sends to the token owner only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for PushPlusConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            channel: default_channel(),
            template: default_template(),
            topic: None,
            endpoint: default_endpoint(),
        }
    }
}

fn default_channel() -> String {
    "wechat".to_string()
}

fn default_template() -> String {
    "html".to_string()
}

fn default_endpoint() -> String {
    "http://www.pushplus.plus/send".to_string()
}

/// Detection and notification timing. All values are seconds unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    #[serde(default = "default_status_poll_interval")]
    pub status_poll_interval: u64,

    /// Delivery attempts per notification.
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,

    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,

    /// Failures within the window that mark an entity offline.
    #[serde(default = "default_heartbeat_threshold")]
    pub heartbeat_threshold: usize,

    #[serde(default = "default_failure_window")]
    pub failure_window: u64,

    #[serde(default = "default_min_resend_interval")]
    pub min_resend_interval: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            status_poll_interval: default_status_poll_interval(),
            retry_times: default_retry_times(),
            retry_interval: default_retry_interval(),
            heartbeat_threshold: default_heartbeat_threshold(),
            failure_window: default_failure_window(),
            min_resend_interval: default_min_resend_interval(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl NotificationConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval)
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window)
    }

    pub fn min_resend_interval(&self) -> Duration {
        Duration::from_secs(self.min_resend_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

fn default_check_interval() -> u64 {
    5
}

fn default_status_poll_interval() -> u64 {
    2
}

fn default_retry_times() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    60
}

fn default_heartbeat_threshold() -> usize {
    3
}

fn default_failure_window() -> u64 {
    300 // 5 minutes
}

fn default_min_resend_interval() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    5
}

/// External status endpoint polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_status_base_url")]
    pub base_url: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_status_base_url(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_status_base_url() -> String {
    "http://127.0.0.1:9000".to_string()
}

/// Active heartbeat probe. Without a URL the probe has no session handle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Persisted evidence log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceConfig {
    #[serde(default = "default_evidence_path")]
    pub path: PathBuf,

    #[serde(default = "default_replay_lines")]
    pub replay_lines: usize,

    #[serde(default = "default_replay_window")]
    pub replay_window: u64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            path: default_evidence_path(),
            replay_lines: default_replay_lines(),
            replay_window: default_replay_window(),
        }
    }
}

impl EvidenceConfig {
    pub fn replay_window(&self) -> Duration {
        Duration::from_secs(self.replay_window)
    }
}

fn default_evidence_path() -> PathBuf {
    PathBuf::from("heartbeat_errors.txt")
}

fn default_replay_lines() -> usize {
    10
}

fn default_replay_window() -> u64 {
    300
}

/// Notification message templates.
///
/// Placeholders: `{entity}`, `{time}`, `{date}`, `{hour}`, `{bot_name}`, `{primary}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageConfig {
    #[serde(default = "default_title_template")]
    pub title_template: String,

    #[serde(default = "default_content_template")]
    pub content_template: String,

    #[serde(default = "default_test_title_template")]
    pub test_title_template: String,

    #[serde(default = "default_test_content_template")]
    pub test_content_template: String,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            title_template: default_title_template(),
            content_template: default_content_template(),
            test_title_template: default_test_title_template(),
            test_content_template: default_test_content_template(),
        }
    }
}

fn default_title_template() -> String {
    "Account offline - {time}".to_string()
}

fn default_content_template() -> String {
    "<p>Account <b>{entity}</b> went offline at <b>{time}</b>.</p>\
     <p>Check the device connection or log in again.</p>"
        .to_string()
}

fn default_test_title_template() -> String {
    "Test notification - {time}".to_string()
}

fn default_test_content_template() -> String {
    "<p>Test message from {bot_name}: notifications are working.</p>\
     <p>Monitored account: <b>{entity}</b></p><p>Sent at {time}</p>"
        .to_string()
}

/// Log output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rolling log files; defaults to `~/.pulseguard/logs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// A monitored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub id: String,

    /// Delivery target override; absent sends to the token owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl EntityConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}
