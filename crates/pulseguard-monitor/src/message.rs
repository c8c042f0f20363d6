//! Notification text rendering.

use chrono::{DateTime, Local, TimeZone};
use pulseguard_config::MessageConfig;

use crate::entity::EntityId;

/// Rendered title and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub title: String,
    pub content: String,
}

/// Fills `{entity}`, `{time}`, `{date}`, `{hour}`, `{bot_name}` and `{primary}` in the
/// configured templates. Unknown placeholders are left as written.
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    templates: MessageConfig,
    bot_name: String,
}

impl MessageRenderer {
    pub fn new(templates: MessageConfig, bot_name: impl Into<String>) -> Self {
        Self {
            templates,
            bot_name: bot_name.into(),
        }
    }

    pub fn templates(&self) -> &MessageConfig {
        &self.templates
    }

    /// Offline notification.
    pub fn offline<Tz: TimeZone>(
        &self,
        entity: &EntityId,
        primary: Option<&EntityId>,
        at: &DateTime<Tz>,
    ) -> RenderedMessage
    where
        Tz::Offset: std::fmt::Display,
    {
        RenderedMessage {
            title: self.fill(&self.templates.title_template, entity, primary, at),
            content: self.fill(&self.templates.content_template, entity, primary, at),
        }
    }

    /// Manual test notification.
    pub fn test<Tz: TimeZone>(
        &self,
        entity: &EntityId,
        primary: Option<&EntityId>,
        at: &DateTime<Tz>,
    ) -> RenderedMessage
    where
        Tz::Offset: std::fmt::Display,
    {
        RenderedMessage {
            title: self.fill(&self.templates.test_title_template, entity, primary, at),
            content: self.fill(&self.templates.test_content_template, entity, primary, at),
        }
    }

    /// Offline notification stamped with the local clock.
    pub fn offline_now(&self, entity: &EntityId, primary: Option<&EntityId>) -> RenderedMessage {
        self.offline(entity, primary, &Local::now())
    }

    pub fn test_now(&self, entity: &EntityId, primary: Option<&EntityId>) -> RenderedMessage {
        self.test(entity, primary, &Local::now())
    }

    fn fill<Tz: TimeZone>(
        &self,
        template: &str,
        entity: &EntityId,
        primary: Option<&EntityId>,
        at: &DateTime<Tz>,
    ) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        let primary = primary.map(EntityId::as_str).unwrap_or("unset");
        template
            .replace("{entity}", entity.as_str())
            .replace("{time}", &at.format("%Y-%m-%d %H:%M:%S").to_string())
            .replace("{date}", &at.format("%Y-%m-%d").to_string())
            .replace("{hour}", &at.format("%H").to_string())
            .replace("{bot_name}", &self.bot_name)
            .replace("{primary}", primary)
    }
}
