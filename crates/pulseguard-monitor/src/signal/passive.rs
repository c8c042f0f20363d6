//! Passive failure evidence scraped from free text.
//!
//! Extraction is a pure function of the text plus a small fallback context, so it can
//! be tested without any registry or runtime.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{FailureEvent, FailureKind, SignalKind};
use crate::entity::EntityId;

#[cfg(test)]
#[path = "passive_tests.rs"]
mod tests;

/// Account identifier format.
pub const ENTITY_PATTERN: &str = r"wxid_\w+";

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ENTITY_PATTERN).expect("entity pattern is valid"));

static ENTITY_EXACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{}$", ENTITY_PATTERN)).expect("entity pattern is valid")
});

/// Failure markers, checked in order against the lowercased text.
const MARKERS: &[(&str, FailureKind)] = &[
    ("heartbeat failed", FailureKind::HeartbeatFailed),
    ("心跳失败", FailureKind::HeartbeatFailed),
    ("用户可能退出", FailureKind::LoggedOut),
    ("已退出", FailureKind::LoggedOut),
    ("获取新消息失败", FailureKind::FetchFailed),
    ("登录异常", FailureKind::Offline),
    ("不在线", FailureKind::Offline),
    ("离线", FailureKind::Offline),
];

/// A marker hit, with the identifier if the text carried one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassiveMatch {
    pub entity: Option<EntityId>,
    pub kind: FailureKind,
}

/// Who to blame when the text names no one.
#[derive(Debug, Clone, Default)]
pub struct FallbackContext {
    pub monitored: Vec<EntityId>,
    pub primary: Option<EntityId>,
}

impl FallbackContext {
    fn resolve(&self) -> Option<EntityId> {
        match self.monitored.as_slice() {
            [only] => Some(only.clone()),
            _ => self.primary.clone(),
        }
    }
}

/// Find the first failure marker and any identifier in `text`.
pub fn scan(text: &str) -> Option<PassiveMatch> {
    let lowered = text.to_lowercase();
    let kind = MARKERS
        .iter()
        .find(|(marker, _)| lowered.contains(marker))
        .map(|(_, kind)| *kind)?;

    Some(PassiveMatch {
        entity: extract_entity(text),
        kind,
    })
}

/// First identifier in `text`, if any.
pub fn extract_entity(text: &str) -> Option<EntityId> {
    ENTITY_RE.find(text).map(|m| EntityId::new(m.as_str()))
}

/// Whether `candidate` is exactly one identifier.
pub fn is_entity_id(candidate: &str) -> bool {
    ENTITY_EXACT_RE.is_match(candidate)
}

/// Resolve `text` to a blamed entity and failure kind.
///
/// An identifier in the text wins even when it is not monitored; the registry drops
/// foreign identities later. Without one, the single monitored entity is used, then
/// the primary entity, else the event is discarded.
pub fn extract_signal(text: &str, fallback: &FallbackContext) -> Option<(EntityId, FailureKind)> {
    let hit = scan(text)?;
    let entity = hit.entity.or_else(|| fallback.resolve())?;
    Some((entity, hit.kind))
}

/// Structured message from the host bot framework. Field aliases accept the
/// framework's native key names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(default, alias = "MsgType")]
    pub msg_type: Option<i64>,

    #[serde(default, alias = "FromWxid")]
    pub from: Option<String>,

    #[serde(default, alias = "ToWxid")]
    pub to: Option<String>,

    #[serde(default, alias = "SenderWxid")]
    pub sender: Option<String>,

    #[serde(default, alias = "Content")]
    pub content: String,
}

impl InboundEvent {
    /// Wrap a raw log line.
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            ..Default::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.content
    }
}

/// Push-driven source over inbound text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassiveTextEvent;

impl PassiveTextEvent {
    /// Turn one piece of text into a failure event, if it is evidence of one.
    pub fn observe(
        &self,
        text: &str,
        fallback: &FallbackContext,
        at: DateTime<Utc>,
        source: SignalKind,
    ) -> Option<FailureEvent> {
        let (entity, kind) = extract_signal(text, fallback)?;
        Some(FailureEvent::new(entity, kind, source, at).with_reason(truncate(text, 160)))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
