//! Monitored entity identity.

use std::borrow::Borrow;
use std::fmt;

use pulseguard_config::EntityConfig;
use serde::{Deserialize, Serialize};

/// Opaque account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// An account in the monitored set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredEntity {
    pub id: EntityId,
    /// Delivery target override; `None` sends to the token owner.
    pub target: Option<String>,
}

impl MonitoredEntity {
    pub fn new(id: impl Into<EntityId>) -> Self {
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

impl From<&EntityConfig> for MonitoredEntity {
    fn from(config: &EntityConfig) -> Self {
        Self {
            id: EntityId::new(config.id.clone()),
            target: config.target.clone().filter(|t| !t.is_empty()),
        }
    }
}
