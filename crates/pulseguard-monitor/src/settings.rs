//! Runtime settings derived from the configuration file.

use std::path::PathBuf;
use std::time::Duration;

use pulseguard_config::{Config, ConfigError, ConfigValidator, MessageConfig, PushPlusConfig};
use tracing::warn;

use crate::aggregator::FailureAggregator;
use crate::delivery::RetryPolicy;
use crate::entity::{EntityId, MonitoredEntity};
use crate::gate::NotificationGate;

/// Immutable snapshot of everything the engine needs. Replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub enabled: bool,
    pub check_interval: Duration,
    pub status_poll_interval: Duration,
    pub failure_window: Duration,
    pub threshold: usize,
    pub min_resend_interval: Duration,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    /// `None` disables status polling.
    pub status_base_url: Option<String>,
    pub probe_url: Option<String>,
    pub evidence_path: PathBuf,
    pub evidence_lines: usize,
    pub evidence_window: Duration,
    pub primary_entity: Option<EntityId>,
    pub auto_detect_entity: bool,
    pub bot_name: String,
    pub messages: MessageConfig,
    pub pushplus: PushPlusConfig,
    /// Monitored set. Includes the primary entity.
    pub entities: Vec<MonitoredEntity>,
}

impl MonitorSettings {
    /// Validate `config` and derive settings. Validation errors reject the whole config.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let warnings = ConfigValidator::validate(config).into_result()?;
        for warning in &warnings {
            warn!("Config warning at {}: {}", warning.path, warning.message);
        }
        Ok(Self::build(config))
    }

    /// Settings with monitoring switched off; used when the config cannot be loaded.
    pub fn disabled() -> Self {
        let mut settings = Self::build(&Config::default());
        settings.enabled = false;
        settings
    }

    fn build(config: &Config) -> Self {
        let n = &config.notification;
        let primary_entity = config
            .basic
            .primary_entity
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(EntityId::new);

        let mut entities: Vec<MonitoredEntity> =
            config.entities.iter().map(MonitoredEntity::from).collect();
        if let Some(primary) = &primary_entity {
            if !entities.iter().any(|e| &e.id == primary) {
                entities.push(MonitoredEntity::new(primary.clone()));
            }
        }

        Self {
            enabled: config.basic.enable,
            check_interval: n.check_interval(),
            status_poll_interval: n.status_poll_interval(),
            failure_window: n.failure_window(),
            threshold: n.heartbeat_threshold,
            min_resend_interval: n.min_resend_interval(),
            retry: RetryPolicy::new(n.retry_times, n.retry_interval()),
            request_timeout: n.request_timeout(),
            status_base_url: config
                .status
                .enabled
                .then(|| config.status.base_url.clone()),
            probe_url: config.probe.url.clone().filter(|u| !u.is_empty()),
            evidence_path: config.evidence.path.clone(),
            evidence_lines: config.evidence.replay_lines,
            evidence_window: config.evidence.replay_window(),
            primary_entity,
            auto_detect_entity: config.basic.auto_detect_entity,
            bot_name: config.basic.bot_name.clone(),
            messages: config.message.clone(),
            pushplus: config.pushplus.clone(),
            entities,
        }
    }

    pub fn aggregator(&self) -> FailureAggregator {
        FailureAggregator::new(self.failure_window, self.threshold)
    }

    pub fn gate(&self) -> NotificationGate {
        NotificationGate::new(self.min_resend_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseguard_config::EntityConfig;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.basic.enable = true;
        config.basic.admins = vec!["wxid_admin".to_string()];
        config.pushplus.token = "tok".to_string();
        config.entities = vec![EntityConfig::new("wxid_bot").with_target("ops")];
        config
    }

    #[test]
    fn test_from_valid_config() {
        let settings = MonitorSettings::from_config(&valid_config()).unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.threshold, 3);
        assert_eq!(settings.failure_window, Duration::from_secs(300));
        assert_eq!(settings.retry.attempts, 3);
        assert_eq!(settings.retry.interval, Duration::from_secs(60));
        assert_eq!(
            settings.status_base_url.as_deref(),
            Some("http://127.0.0.1:9000")
        );
        assert_eq!(settings.entities.len(), 1);
        assert_eq!(settings.entities[0].target.as_deref(), Some("ops"));
    }

    #[test]
    fn test_primary_joins_monitored_set() {
        let mut config = valid_config();
        config.basic.primary_entity = Some("wxid_main".to_string());
        let settings = MonitorSettings::from_config(&config).unwrap();
        assert_eq!(settings.primary_entity, Some(EntityId::new("wxid_main")));
        assert!(settings.entities.iter().any(|e| e.id.as_str() == "wxid_main"));

        config.basic.primary_entity = Some("wxid_bot".to_string());
        let settings = MonitorSettings::from_config(&config).unwrap();
        assert_eq!(settings.entities.len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = valid_config();
        config.notification.heartbeat_threshold = 0;
        assert!(matches!(
            MonitorSettings::from_config(&config),
            Err(ConfigError::Rejected(_))
        ));
    }

    #[test]
    fn test_status_disabled() {
        let mut config = valid_config();
        config.status.enabled = false;
        let settings = MonitorSettings::from_config(&config).unwrap();
        assert_eq!(settings.status_base_url, None);
    }

    #[test]
    fn test_disabled_settings() {
        let settings = MonitorSettings::disabled();
        assert!(!settings.enabled);
        assert!(settings.entities.is_empty());
    }
}
