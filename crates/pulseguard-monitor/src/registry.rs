//! Per-entity monitoring state.
//!
//! The registry owns every per-entity map. Membership in the registry is what
//! "monitored" means; removing an entity drops its failure, offline and notification
//! state with it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::{FailureAggregator, FailureRecord};
use crate::entity::{EntityId, MonitoredEntity};
use crate::gate::{NotificationGate, NotificationState};
use crate::signal::FallbackContext;

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

#[derive(Debug, Default)]
struct EntityState {
    target: Option<String>,
    failures: FailureRecord,
    notification: NotificationState,
    offline: bool,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
struct EntitySlot {
    state: Mutex<EntityState>,
    /// Held for a whole notification transaction.
    notify_guard: Arc<tokio::sync::Mutex<()>>,
}

/// Result of recording one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub count: usize,
    pub over_threshold: bool,
    /// The entity crossed into the offline state with this failure.
    pub became_offline: bool,
}

/// Point-in-time view of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub offline: bool,
    pub failures_in_window: usize,
    pub last_notified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Shared monitoring state, handed to tasks through `Arc`.
pub struct MonitorRegistry {
    slots: DashMap<EntityId, Arc<EntitySlot>>,
    aggregator: RwLock<FailureAggregator>,
    gate: RwLock<NotificationGate>,
    primary: RwLock<Option<EntityId>>,
}

impl MonitorRegistry {
    pub fn new(aggregator: FailureAggregator, gate: NotificationGate) -> Self {
        Self {
            slots: DashMap::new(),
            aggregator: RwLock::new(aggregator),
            gate: RwLock::new(gate),
            primary: RwLock::new(None),
        }
    }

    /// Replace window, threshold and resend policy. Recorded state is kept.
    pub fn set_policies(&self, aggregator: FailureAggregator, gate: NotificationGate) {
        *self.aggregator.write() = aggregator;
        *self.gate.write() = gate;
    }

    pub fn aggregator(&self) -> FailureAggregator {
        *self.aggregator.read()
    }

    pub fn gate(&self) -> NotificationGate {
        *self.gate.read()
    }

    // ---- membership ----

    /// Add an entity. Returns false if it was already monitored (its target is updated).
    pub fn add(&self, entity: MonitoredEntity) -> bool {
        match self.slots.entry(entity.id.clone()) {
            Entry::Occupied(occupied) => {
                occupied.get().state.lock().target = entity.target;
                false
            }
            Entry::Vacant(vacant) => {
                let slot = EntitySlot::default();
                slot.state.lock().target = entity.target;
                vacant.insert(Arc::new(slot));
                info!("Monitoring entity {}", entity.id);
                true
            }
        }
    }

    /// Remove an entity and all of its state.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.slots.remove(id).is_some();
        if removed {
            info!("Stopped monitoring entity {}", id);
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Monitored ids, sorted.
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.slots.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn entity(&self, id: &str) -> Option<MonitoredEntity> {
        let slot = self.slot(id)?;
        let target = slot.state.lock().target.clone();
        Some(MonitoredEntity {
            id: EntityId::new(id),
            target,
        })
    }

    /// Make the monitored set equal to `entities`, keeping state of entities that stay.
    pub fn sync(&self, entities: &[MonitoredEntity]) {
        self.slots
            .retain(|id, _| entities.iter().any(|e| &e.id == id));
        for entity in entities {
            self.add(entity.clone());
        }
    }

    // ---- fallback identity ----

    pub fn primary(&self) -> Option<EntityId> {
        self.primary.read().clone()
    }

    pub fn set_primary(&self, primary: Option<EntityId>) {
        *self.primary.write() = primary;
    }

    pub fn fallback_context(&self) -> FallbackContext {
        FallbackContext {
            monitored: self.ids(),
            primary: self.primary(),
        }
    }

    // ---- failure state ----

    /// Record a failure. Unmonitored entities are ignored and yield `None`.
    pub fn record_failure(&self, id: &str, at: DateTime<Utc>) -> Option<FailureOutcome> {
        let Some(slot) = self.slot(id) else {
            debug!("Ignoring failure for unmonitored entity {}", id);
            return None;
        };
        let aggregator = self.aggregator();

        let mut state = slot.state.lock();
        let count = aggregator.record(&mut state.failures, at);
        let over_threshold = count >= aggregator.threshold();
        let became_offline = over_threshold && !state.offline;
        if over_threshold {
            state.offline = true;
        }
        drop(state);

        if became_offline {
            warn!(
                "Entity {} considered offline ({} failures within {}s)",
                id,
                count,
                aggregator.window().num_seconds()
            );
        }

        Some(FailureOutcome {
            count,
            over_threshold,
            became_offline,
        })
    }

    pub fn is_over_threshold(&self, id: &str, now: DateTime<Utc>) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        let aggregator = self.aggregator();
        let state = slot.state.lock();
        aggregator.is_over_threshold(&state.failures, now)
    }

    pub fn is_offline(&self, id: &str) -> bool {
        self.slot(id).is_some_and(|slot| slot.state.lock().offline)
    }

    /// Whether a notification for `id` is due at `now`. Does not mutate state.
    pub fn should_notify(&self, id: &str, now: DateTime<Utc>) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        let aggregator = self.aggregator();
        let gate = self.gate();
        let state = slot.state.lock();
        let over = aggregator.is_over_threshold(&state.failures, now);
        gate.should_notify(over, &state.notification, now)
    }

    pub fn resend_remaining(&self, id: &str, now: DateTime<Utc>) -> Option<Duration> {
        let slot = self.slot(id)?;
        let gate = self.gate();
        let state = slot.state.lock();
        gate.resend_remaining(&state.notification, now)
    }

    /// Clear the offline flag. Failure and notification history are untouched.
    pub fn record_recovery(&self, id: &str) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        let mut state = slot.state.lock();
        let was_offline = std::mem::replace(&mut state.offline, false);
        drop(state);

        if was_offline {
            info!("Entity {} is back online", id);
        }
        was_offline
    }

    /// Commit a successful notification sent for a decision taken at `now`.
    pub fn commit_success(&self, id: &str, now: DateTime<Utc>) {
        let Some(slot) = self.slot(id) else {
            debug!("Entity {} removed during notification, nothing to commit", id);
            return;
        };
        let gate = self.gate();
        let mut state = slot.state.lock();
        let EntityState {
            failures,
            notification,
            last_error,
            ..
        } = &mut *state;
        gate.record_success(notification, failures, now);
        *last_error = None;
    }

    pub fn record_delivery_error(&self, id: &str, error: impl Into<String>) {
        if let Some(slot) = self.slot(id) {
            slot.state.lock().last_error = Some(error.into());
        }
    }

    // ---- views ----

    pub fn snapshot(&self, id: &str, now: DateTime<Utc>) -> Option<EntitySnapshot> {
        let slot = self.slot(id)?;
        let aggregator = self.aggregator();
        let state = slot.state.lock();
        Some(EntitySnapshot {
            id: EntityId::new(id),
            target: state.target.clone(),
            offline: state.offline,
            failures_in_window: aggregator.count(&state.failures, now),
            last_notified: state.notification.last_notified,
            last_error: state.last_error.clone(),
        })
    }

    /// Snapshots of every entity, sorted by id.
    pub fn snapshots(&self, now: DateTime<Utc>) -> Vec<EntitySnapshot> {
        self.ids()
            .iter()
            .filter_map(|id| self.snapshot(id.as_str(), now))
            .collect()
    }

    pub(crate) fn notify_guard(&self, id: &str) -> Option<Arc<tokio::sync::Mutex<()>>> {
        self.slot(id).map(|slot| slot.notify_guard.clone())
    }

    fn slot(&self, id: &str) -> Option<Arc<EntitySlot>> {
        self.slots.get(id).map(|slot| slot.value().clone())
    }
}
