use super::*;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn registry() -> MonitorRegistry {
    MonitorRegistry::new(
        FailureAggregator::new(Duration::from_secs(300), 3),
        NotificationGate::new(Duration::from_secs(3600)),
    )
}

#[test]
fn test_add_remove_contains() {
    let reg = registry();
    assert!(reg.add(MonitoredEntity::new("wxid_a")));
    assert!(!reg.add(MonitoredEntity::new("wxid_a").with_target("friend")));
    assert!(reg.contains("wxid_a"));
    assert_eq!(reg.entity("wxid_a").unwrap().target.as_deref(), Some("friend"));

    assert!(reg.remove("wxid_a"));
    assert!(!reg.remove("wxid_a"));
    assert!(reg.is_empty());
}

#[test]
fn test_unmonitored_failures_ignored() {
    let reg = registry();
    assert_eq!(reg.record_failure("wxid_ghost", at(0)), None);
    assert!(!reg.contains("wxid_ghost"));
    assert!(!reg.should_notify("wxid_ghost", at(0)));
}

#[test]
fn test_threshold_marks_offline_once() {
    let reg = registry();
    reg.add(MonitoredEntity::new("wxid_a"));

    let first = reg.record_failure("wxid_a", at(0)).unwrap();
    assert_eq!(first.count, 1);
    assert!(!first.over_threshold);

    reg.record_failure("wxid_a", at(10));
    let third = reg.record_failure("wxid_a", at(20)).unwrap();
    assert!(third.over_threshold);
    assert!(third.became_offline);
    assert!(reg.is_offline("wxid_a"));

    let fourth = reg.record_failure("wxid_a", at(30)).unwrap();
    assert!(fourth.over_threshold);
    assert!(!fourth.became_offline);
}

#[test]
fn test_remove_discards_state() {
    let reg = registry();
    reg.add(MonitoredEntity::new("wxid_a"));
    for t in [0, 1, 2] {
        reg.record_failure("wxid_a", at(t));
    }
    reg.commit_success("wxid_a", at(2));
    reg.remove("wxid_a");
    reg.add(MonitoredEntity::new("wxid_a"));

    let snap = reg.snapshot("wxid_a", at(3)).unwrap();
    assert!(!snap.offline);
    assert_eq!(snap.failures_in_window, 0);
    assert_eq!(snap.last_notified, None);
}

#[test]
fn test_commit_success_resets_failures() {
    let reg = registry();
    reg.add(MonitoredEntity::new("wxid_a"));
    for t in [0, 10, 20] {
        reg.record_failure("wxid_a", at(t));
    }
    assert!(reg.should_notify("wxid_a", at(20)));
    reg.record_delivery_error("wxid_a", "HTTP 500");
    reg.commit_success("wxid_a", at(20));

    let snap = reg.snapshot("wxid_a", at(20)).unwrap();
    assert_eq!(snap.failures_in_window, 0);
    assert_eq!(snap.last_notified, Some(at(20)));
    assert_eq!(snap.last_error, None);
    assert!(!reg.should_notify("wxid_a", at(20)));

    for t in [100, 101, 102] {
        reg.record_failure("wxid_a", at(t));
    }
    assert!(reg.is_over_threshold("wxid_a", at(102)));
    assert!(!reg.should_notify("wxid_a", at(102)));
    // By the time the interval has passed the failures have aged out.
    assert!(!reg.should_notify("wxid_a", at(3620)));
    assert_eq!(
        reg.resend_remaining("wxid_a", at(620)),
        Some(Duration::from_secs(3000))
    );
}

#[test]
fn test_recovery_clears_offline_only() {
    let reg = registry();
    reg.add(MonitoredEntity::new("wxid_a"));
    for t in [0, 1, 2] {
        reg.record_failure("wxid_a", at(t));
    }
    assert!(reg.record_recovery("wxid_a"));
    assert!(!reg.record_recovery("wxid_a"));

    let snap = reg.snapshot("wxid_a", at(3)).unwrap();
    assert!(!snap.offline);
    assert_eq!(snap.failures_in_window, 3);
}

#[test]
fn test_sync_keeps_surviving_state() {
    let reg = registry();
    reg.add(MonitoredEntity::new("wxid_a"));
    reg.add(MonitoredEntity::new("wxid_b"));
    reg.record_failure("wxid_a", at(0));

    reg.sync(&[
        MonitoredEntity::new("wxid_a").with_target("ops"),
        MonitoredEntity::new("wxid_c"),
    ]);

    let ids: Vec<String> = reg.ids().iter().map(|id| id.to_string()).collect();
    assert_eq!(ids, vec!["wxid_a", "wxid_c"]);
    let snap = reg.snapshot("wxid_a", at(1)).unwrap();
    assert_eq!(snap.failures_in_window, 1);
    assert_eq!(snap.target.as_deref(), Some("ops"));
}

#[test]
fn test_fallback_context() {
    let reg = registry();
    reg.set_primary(Some("wxid_main".into()));
    reg.add(MonitoredEntity::new("wxid_a"));

    let ctx = reg.fallback_context();
    assert_eq!(ctx.monitored, vec![EntityId::from("wxid_a")]);
    assert_eq!(ctx.primary, Some(EntityId::from("wxid_main")));
}

#[test]
fn test_snapshots_sorted() {
    let reg = registry();
    reg.add(MonitoredEntity::new("wxid_b"));
    reg.add(MonitoredEntity::new("wxid_a"));
    let snaps = reg.snapshots(at(0));
    assert_eq!(snaps[0].id.as_str(), "wxid_a");
    assert_eq!(snaps[1].id.as_str(), "wxid_b");
}

#[test]
fn test_policy_swap_applies_to_existing_state() {
    let reg = registry();
    reg.add(MonitoredEntity::new("wxid_a"));
    reg.record_failure("wxid_a", at(0));
    assert!(!reg.is_over_threshold("wxid_a", at(0)));

    reg.set_policies(
        FailureAggregator::new(Duration::from_secs(300), 1),
        NotificationGate::new(Duration::from_secs(60)),
    );
    assert!(reg.is_over_threshold("wxid_a", at(0)));
    assert_eq!(reg.gate().min_resend().num_seconds(), 60);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_all_counted() {
    let reg = Arc::new(MonitorRegistry::new(
        FailureAggregator::new(Duration::from_secs(300), 1000),
        NotificationGate::new(Duration::from_secs(3600)),
    ));
    reg.add(MonitoredEntity::new("wxid_a"));
    reg.add(MonitoredEntity::new("wxid_b"));

    let mut handles = Vec::new();
    for i in 0..8 {
        let reg = reg.clone();
        handles.push(tokio::spawn(async move {
            let id = if i % 2 == 0 { "wxid_a" } else { "wxid_b" };
            for n in 0..25 {
                reg.record_failure(id, at(n));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(reg.snapshot("wxid_a", at(30)).unwrap().failures_in_window, 100);
    assert_eq!(reg.snapshot("wxid_b", at(30)).unwrap().failures_in_window, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_keep_one_slot() {
    let reg = Arc::new(registry());

    let mut handles = Vec::new();
    for n in 0..16 {
        let reg = reg.clone();
        handles.push(tokio::spawn(async move {
            let added = reg.add(MonitoredEntity::new("wxid_a"));
            reg.record_failure("wxid_a", at(n));
            added
        }));
    }

    let mut added = 0;
    for handle in handles {
        if handle.await.unwrap() {
            added += 1;
        }
    }

    assert_eq!(added, 1);
    assert_eq!(reg.len(), 1);
    // No failure recorded into a slot that a later add replaced.
    assert_eq!(reg.snapshot("wxid_a", at(20)).unwrap().failures_in_window, 16);
}
