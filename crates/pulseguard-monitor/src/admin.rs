//! Administrative operations.
//!
//! Every command passes the authorization check first. A rejected sender gets
//! [`AdminError::Unauthorized`] and nothing is changed. Changes are applied to the
//! running service and then persisted through the [`ConfigStore`]; a failed write is
//! logged and does not undo the in-memory change.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use pulseguard_config::{
    Config, ConfigLoader, ConfigStore, EntityConfig, MessageConfig, VALID_CHANNELS,
};
use tracing::{info, warn};

use crate::delivery::DeliveryReceipt;
use crate::entity::{EntityId, MonitoredEntity};
use crate::error::{AdminError, MonitorError};
use crate::service::{Diagnostic, MonitorService, StatusReport};

#[cfg(test)]
#[path = "admin_tests.rs"]
mod tests;

/// Decides who may run admin commands.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_authorized(&self, sender: &str) -> bool;

    /// Pick up a reloaded configuration.
    fn refresh(&self, _config: &Config) {}
}

/// Fixed allow-list, refreshed from `basic.admins` on reload.
#[derive(Debug, Default)]
pub struct StaticAdmins {
    admins: RwLock<HashSet<String>>,
}

impl StaticAdmins {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admins: RwLock::new(admins.into_iter().map(Into::into).collect()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.basic.admins.iter().cloned())
    }
}

#[async_trait]
impl Authorizer for StaticAdmins {
    async fn is_authorized(&self, sender: &str) -> bool {
        self.admins.read().contains(sender)
    }

    fn refresh(&self, config: &Config) {
        *self.admins.write() = config.basic.admins.iter().cloned().collect();
    }
}

/// Which message template to replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Title,
    Content,
    TestTitle,
    TestContent,
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "title" => Ok(TemplateKind::Title),
            "content" => Ok(TemplateKind::Content),
            "test_title" => Ok(TemplateKind::TestTitle),
            "test_content" => Ok(TemplateKind::TestContent),
            other => Err(format!(
                "unknown template '{}' (expected title, content, test_title or test_content)",
                other
            )),
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKind::Title => write!(f, "title"),
            TemplateKind::Content => write!(f, "content"),
            TemplateKind::TestTitle => write!(f, "test_title"),
            TemplateKind::TestContent => write!(f, "test_content"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Status,
    Add { id: EntityId, target: Option<String> },
    Remove { id: EntityId },
    Reload,
    /// Test notification; defaults to the primary entity.
    Test { id: Option<EntityId> },
    Channel { channel: String },
    /// On-demand heartbeat diagnostic.
    Heartbeat { id: Option<EntityId> },
    Template { kind: TemplateKind, text: String },
}

#[derive(Debug, Clone)]
pub enum AdminReply {
    Status(StatusReport),
    Added(EntityId),
    Removed(EntityId),
    Reloaded(StatusReport),
    TestSent {
        entity: EntityId,
        receipt: DeliveryReceipt,
    },
    ChannelChanged(String),
    Diagnostic(Diagnostic),
    TemplateUpdated(TemplateKind),
}

impl fmt::Display for AdminReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminReply::Status(report) => write!(f, "{}", report),
            AdminReply::Added(id) => write!(f, "Now monitoring {}", id),
            AdminReply::Removed(id) => write!(f, "Stopped monitoring {}", id),
            AdminReply::Reloaded(report) => write!(f, "Configuration reloaded\n{}", report),
            AdminReply::TestSent { entity, receipt } => write!(
                f,
                "Test notification for {} sent ({} attempt(s))",
                entity, receipt.attempts
            ),
            AdminReply::ChannelChanged(channel) => write!(f, "Delivery channel set to {}", channel),
            AdminReply::Diagnostic(diag) => write!(f, "{}", diag),
            AdminReply::TemplateUpdated(kind) => write!(f, "Template '{}' updated", kind),
        }
    }
}

/// Executes admin commands against a running service.
pub struct AdminService {
    service: Arc<MonitorService>,
    authorizer: Arc<dyn Authorizer>,
    store: Option<ConfigStore>,
}

impl AdminService {
    pub fn new(service: Arc<MonitorService>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            service,
            authorizer,
            store: None,
        }
    }

    pub fn with_store(mut self, store: ConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn service(&self) -> &Arc<MonitorService> {
        &self.service
    }

    pub async fn execute(&self, sender: &str, command: AdminCommand) -> Result<AdminReply, AdminError> {
        if !self.authorizer.is_authorized(sender).await {
            warn!("Rejected admin command {:?} from {}", command, sender);
            return Err(AdminError::Unauthorized(sender.to_string()));
        }
        info!("Admin command from {}: {:?}", sender, command);

        match command {
            AdminCommand::Status => Ok(AdminReply::Status(self.service.status(Utc::now()))),
            AdminCommand::Add { id, target } => self.add(id, target),
            AdminCommand::Remove { id } => self.remove(id),
            AdminCommand::Reload => Ok(AdminReply::Reloaded(self.reload_config().await?)),
            AdminCommand::Test { id } => {
                let entity = self.resolve(id)?;
                let receipt = self
                    .service
                    .send_test(&entity)
                    .await
                    .map_err(MonitorError::from)?;
                Ok(AdminReply::TestSent { entity, receipt })
            }
            AdminCommand::Channel { channel } => self.channel(channel),
            AdminCommand::Heartbeat { id } => {
                let entity = self.resolve(id)?;
                Ok(AdminReply::Diagnostic(self.service.diagnose(&entity).await))
            }
            AdminCommand::Template { kind, text } => self.template(kind, text),
        }
    }

    fn add(&self, id: EntityId, target: Option<String>) -> Result<AdminReply, AdminError> {
        if self.service.registry().contains(id.as_str()) {
            return Err(AdminError::DuplicateEntity(id.to_string()));
        }

        let mut entity = MonitoredEntity::new(id.clone());
        entity.target = target.clone().filter(|t| !t.is_empty());
        self.service.add_entity(entity);

        self.persist(|config| {
            if !config.has_entity(id.as_str()) {
                let mut entry = EntityConfig::new(id.as_str());
                entry.target = target.filter(|t| !t.is_empty());
                config.entities.push(entry);
            }
        });
        Ok(AdminReply::Added(id))
    }

    fn remove(&self, id: EntityId) -> Result<AdminReply, AdminError> {
        if !self.service.remove_entity(id.as_str()) {
            return Err(AdminError::UnknownEntity(id.to_string()));
        }
        self.persist(|config| config.entities.retain(|e| e.id != id.as_str()));
        Ok(AdminReply::Removed(id))
    }

    /// Re-read the stored configuration and apply it. Also used for SIGHUP.
    pub async fn reload_config(&self) -> Result<StatusReport, AdminError> {
        let store = self.store.as_ref().ok_or(AdminError::NoConfigStore)?;
        match ConfigLoader::load(store.path()) {
            Ok(config) => {
                self.service.reload(Ok(config.clone())).await?;
                self.authorizer.refresh(&config);
            }
            Err(e) => self.service.reload(Err(e)).await?,
        }
        Ok(self.service.status(Utc::now()))
    }

    fn channel(&self, channel: String) -> Result<AdminReply, AdminError> {
        let channel = channel.trim().to_lowercase();
        if !VALID_CHANNELS.contains(&channel.as_str()) {
            return Err(AdminError::InvalidChannel(channel));
        }
        self.service
            .set_channel(&channel)
            .map_err(MonitorError::from)?;
        self.persist(|config| config.pushplus.channel = channel.clone());
        Ok(AdminReply::ChannelChanged(channel))
    }

    fn template(&self, kind: TemplateKind, text: String) -> Result<AdminReply, AdminError> {
        let mut messages = self.service.settings().messages;
        set_template(&mut messages, kind, text.clone());
        self.service.set_templates(messages);
        self.persist(|config| set_template(&mut config.message, kind, text));
        Ok(AdminReply::TemplateUpdated(kind))
    }

    fn resolve(&self, id: Option<EntityId>) -> Result<EntityId, AdminError> {
        id.or_else(|| self.service.default_entity())
            .ok_or(AdminError::NoEntity)
    }

    fn persist<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Config),
    {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.update(mutate) {
            warn!(
                "Change applied but not saved to {}: {}",
                store.path().display(),
                e
            );
        }
    }
}

fn set_template(messages: &mut MessageConfig, kind: TemplateKind, text: String) {
    match kind {
        TemplateKind::Title => messages.title_template = text,
        TemplateKind::Content => messages.content_template = text,
        TemplateKind::TestTitle => messages.test_title_template = text,
        TemplateKind::TestContent => messages.test_content_template = text,
    }
}
