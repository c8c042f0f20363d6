//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{Config, VALID_CHANNELS};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Collapse errors into a single `ConfigError`, or `Ok` when valid.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        if self.is_valid() {
            return Ok(self.warnings);
        }
        let joined = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ConfigError::Rejected(joined))
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_pushplus(config, &mut result);
        Self::validate_notification(config, &mut result);
        Self::validate_endpoints(config, &mut result);
        Self::validate_entities(config, &mut result);

        result
    }

    fn validate_pushplus(config: &Config, result: &mut ValidationResult) {
        // A disabled monitor may carry an incomplete token
        if config.basic.enable && config.pushplus.token.trim().is_empty() {
            result.add_error(ValidationError::new(
                "pushplus.token",
                "Token cannot be empty while monitoring is enabled",
            ));
        }

        if !VALID_CHANNELS.contains(&config.pushplus.channel.as_str()) {
            result.add_error(ValidationError::new(
                "pushplus.channel",
                format!(
                    "Unknown channel '{}', valid values: {:?}",
                    config.pushplus.channel, VALID_CHANNELS
                ),
            ));
        }

        if !is_http_url(&config.pushplus.endpoint) {
            result.add_error(ValidationError::new(
                "pushplus.endpoint",
                "endpoint must be an http:// or https:// URL",
            ));
        }
    }

    fn validate_notification(config: &Config, result: &mut ValidationResult) {
        let n = &config.notification;

        if n.heartbeat_threshold == 0 {
            result.add_error(ValidationError::new(
                "notification.heartbeat_threshold",
                "heartbeat_threshold must be greater than 0",
            ));
        }

        if n.retry_times == 0 {
            result.add_error(ValidationError::new(
                "notification.retry_times",
                "retry_times must be greater than 0",
            ));
        }

        for (path, value) in [
            ("notification.check_interval", n.check_interval),
            ("notification.status_poll_interval", n.status_poll_interval),
            ("notification.failure_window", n.failure_window),
            ("notification.request_timeout", n.request_timeout),
        ] {
            if value == 0 {
                result.add_error(ValidationError::new(path, "must be greater than 0"));
            }
        }

        if n.failure_window < n.check_interval * n.heartbeat_threshold as u64 {
            result.add_warning(ValidationWarning::new(
                "notification.failure_window",
                "failure_window is shorter than threshold * check_interval, \
                 active probes alone can never reach the threshold",
            ));
        }

        if n.min_resend_interval == 0 {
            result.add_warning(ValidationWarning::new(
                "notification.min_resend_interval",
                "min_resend_interval is 0, every threshold crossing will notify",
            ));
        }
    }

    fn validate_endpoints(config: &Config, result: &mut ValidationResult) {
        if config.status.enabled && !is_http_url(&config.status.base_url) {
            result.add_error(ValidationError::new(
                "status.base_url",
                "base_url must be an http:// or https:// URL",
            ));
        }

        if let Some(ref url) = config.probe.url {
            if !is_http_url(url) {
                result.add_error(ValidationError::new(
                    "probe.url",
                    "url must be an http:// or https:// URL",
                ));
            }
        }
    }

    fn validate_entities(config: &Config, result: &mut ValidationResult) {
        for (i, entity) in config.entities.iter().enumerate() {
            if entity.id.trim().is_empty() {
                result.add_error(ValidationError::new(
                    format!("entities[{}].id", i),
                    "Entity id cannot be empty",
                ));
            }
            if config.entities[..i].iter().any(|e| e.id == entity.id) {
                result.add_error(ValidationError::new(
                    format!("entities[{}].id", i),
                    format!("Duplicate entity '{}'", entity.id),
                ));
            }
        }

        if config.basic.enable
            && config.entities.is_empty()
            && config.basic.primary_entity.is_none()
            && !config.basic.auto_detect_entity
        {
            result.add_warning(ValidationWarning::new(
                "entities",
                "No entities configured, nothing will be monitored",
            ));
        }

        if config.basic.admins.is_empty() {
            result.add_warning(ValidationWarning::new(
                "basic.admins",
                "No admins configured, administrative commands will always be rejected",
            ));
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
