//! Sliding-window failure counting.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod tests;

/// Failure timestamps for one entity, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureRecord {
    timestamps: VecDeque<DateTime<Utc>>,
}

impl FailureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.timestamps.back().copied()
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.timestamps.iter()
    }

    fn insert(&mut self, at: DateTime<Utc>) {
        let pos = self.timestamps.partition_point(|t| *t <= at);
        self.timestamps.insert(pos, at);
    }
}

/// Window and threshold policy. An entity is over threshold when at least
/// `threshold` failures fall inside the trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureAggregator {
    window: TimeDelta,
    threshold: usize,
}

impl FailureAggregator {
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            threshold,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Record a failure and return the in-window count afterwards.
    ///
    /// Late events are inserted in order. Pruning is relative to the newest failure.
    pub fn record(&self, record: &mut FailureRecord, at: DateTime<Utc>) -> usize {
        record.insert(at);
        let newest = record.latest().unwrap_or(at);
        self.prune(record, newest);
        record.len()
    }

    /// Drop failures older than the window.
    pub fn prune(&self, record: &mut FailureRecord, now: DateTime<Utc>) {
        while let Some(oldest) = record.timestamps.front() {
            if self.expired(*oldest, now) {
                record.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Failures inside the window at `now`, without mutating the record.
    pub fn count(&self, record: &FailureRecord, now: DateTime<Utc>) -> usize {
        record.iter().filter(|t| !self.expired(**t, now)).count()
    }

    pub fn is_over_threshold(&self, record: &FailureRecord, now: DateTime<Utc>) -> bool {
        self.count(record, now) >= self.threshold
    }

    fn expired(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(at) > self.window
    }
}
