use super::*;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn aggregator() -> FailureAggregator {
    FailureAggregator::new(Duration::from_secs(300), 3)
}

#[test]
fn test_threshold_reached_on_third_failure() {
    let agg = aggregator();
    let mut record = FailureRecord::new();

    assert_eq!(agg.record(&mut record, at(0)), 1);
    assert!(!agg.is_over_threshold(&record, at(0)));
    assert_eq!(agg.record(&mut record, at(10)), 2);
    assert!(!agg.is_over_threshold(&record, at(10)));
    assert_eq!(agg.record(&mut record, at(20)), 3);
    assert!(agg.is_over_threshold(&record, at(20)));
}

#[test]
fn test_reset_requires_fresh_failures() {
    let agg = aggregator();
    let mut record = FailureRecord::new();
    for t in [0, 10, 20] {
        agg.record(&mut record, at(t));
    }
    assert!(agg.is_over_threshold(&record, at(20)));

    record.clear();
    assert!(!agg.is_over_threshold(&record, at(20)));

    agg.record(&mut record, at(21));
    agg.record(&mut record, at(22));
    assert!(!agg.is_over_threshold(&record, at(22)));
    agg.record(&mut record, at(23));
    assert!(agg.is_over_threshold(&record, at(23)));
}

#[test]
fn test_window_boundary_is_inclusive() {
    let agg = aggregator();
    let mut record = FailureRecord::new();
    agg.record(&mut record, at(0));
    agg.record(&mut record, at(100));

    // Exactly one window old still counts.
    assert_eq!(agg.count(&record, at(300)), 2);
    assert_eq!(agg.count(&record, at(301)), 1);

    assert_eq!(agg.record(&mut record, at(400)), 2);
    assert_eq!(record.iter().next(), Some(&at(100)));
}

#[test]
fn test_spread_out_failures_never_trip() {
    let agg = aggregator();
    let mut record = FailureRecord::new();
    for t in [0, 200, 400, 600, 800] {
        agg.record(&mut record, at(t));
        assert!(!agg.is_over_threshold(&record, at(t)));
    }
}

#[test]
fn test_out_of_order_insert_keeps_order() {
    let agg = aggregator();
    let mut record = FailureRecord::new();
    agg.record(&mut record, at(50));
    agg.record(&mut record, at(10));
    agg.record(&mut record, at(30));

    let order: Vec<_> = record.iter().copied().collect();
    assert_eq!(order, vec![at(10), at(30), at(50)]);
    assert_eq!(record.latest(), Some(at(50)));
}

#[test]
fn test_late_event_outside_window_is_dropped() {
    let agg = aggregator();
    let mut record = FailureRecord::new();
    agg.record(&mut record, at(1000));
    assert_eq!(agg.record(&mut record, at(100)), 1);
}

#[test]
fn test_count_does_not_mutate() {
    let agg = aggregator();
    let mut record = FailureRecord::new();
    agg.record(&mut record, at(0));
    assert_eq!(agg.count(&record, at(10_000)), 0);
    assert_eq!(record.len(), 1);

    agg.prune(&mut record, at(10_000));
    assert!(record.is_empty());
}
