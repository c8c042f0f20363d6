//! Notification deduplication.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::aggregator::FailureRecord;

/// Per-entity delivery history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationState {
    pub last_notified: Option<DateTime<Utc>>,
}

/// Minimum resend interval between successful notifications for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationGate {
    min_resend: TimeDelta,
}

impl NotificationGate {
    pub fn new(min_resend: Duration) -> Self {
        Self {
            min_resend: TimeDelta::from_std(min_resend).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn min_resend(&self) -> TimeDelta {
        self.min_resend
    }

    /// Pure decision: over threshold and outside the resend interval.
    pub fn should_notify(
        &self,
        over_threshold: bool,
        state: &NotificationState,
        now: DateTime<Utc>,
    ) -> bool {
        over_threshold && self.resend_remaining(state, now).is_none()
    }

    /// Time left before another notification may go out, `None` when allowed now.
    pub fn resend_remaining(&self, state: &NotificationState, now: DateTime<Utc>) -> Option<Duration> {
        let last = state.last_notified?;
        let elapsed = now.signed_duration_since(last);
        if elapsed >= self.min_resend {
            return None;
        }
        (self.min_resend - elapsed).to_std().ok()
    }

    /// Commit a successful delivery made at `now`.
    pub fn record_success(
        &self,
        state: &mut NotificationState,
        failures: &mut FailureRecord,
        now: DateTime<Utc>,
    ) {
        state.last_notified = Some(now);
        failures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::FailureAggregator;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_first_notification_allowed() {
        let gate = NotificationGate::new(Duration::from_secs(3600));
        let state = NotificationState::default();
        assert!(gate.should_notify(true, &state, at(0)));
        assert!(!gate.should_notify(false, &state, at(0)));
    }

    #[test]
    fn test_should_notify_is_idempotent() {
        let gate = NotificationGate::new(Duration::from_secs(3600));
        let state = NotificationState::default();
        let first = gate.should_notify(true, &state, at(5));
        let second = gate.should_notify(true, &state, at(5));
        assert_eq!(first, second);
        assert_eq!(state, NotificationState::default());
    }

    #[test]
    fn test_resend_interval_suppresses() {
        let gate = NotificationGate::new(Duration::from_secs(3600));
        let agg = FailureAggregator::new(Duration::from_secs(300), 3);
        let mut state = NotificationState::default();
        let mut failures = FailureRecord::new();

        for t in [0, 0, 0] {
            agg.record(&mut failures, at(t));
        }
        assert!(gate.should_notify(agg.is_over_threshold(&failures, at(0)), &state, at(0)));
        gate.record_success(&mut state, &mut failures, at(0));
        assert!(failures.is_empty());

        for t in [90, 95, 100] {
            agg.record(&mut failures, at(t));
        }
        assert!(agg.is_over_threshold(&failures, at(100)));
        assert!(!gate.should_notify(true, &state, at(100)));
        assert!(!gate.should_notify(true, &state, at(3599)));
        assert!(gate.should_notify(true, &state, at(3600)));
    }

    #[test]
    fn test_resend_remaining() {
        let gate = NotificationGate::new(Duration::from_secs(3600));
        let state = NotificationState {
            last_notified: Some(at(0)),
        };
        assert_eq!(gate.resend_remaining(&state, at(600)), Some(Duration::from_secs(3000)));
        assert_eq!(gate.resend_remaining(&state, at(3600)), None);
        assert_eq!(gate.resend_remaining(&NotificationState::default(), at(0)), None);
    }

    #[test]
    fn test_zero_interval_never_suppresses() {
        let gate = NotificationGate::new(Duration::ZERO);
        let state = NotificationState {
            last_notified: Some(at(10)),
        };
        assert!(gate.should_notify(true, &state, at(10)));
    }
}
