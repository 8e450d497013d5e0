//! Bucket boundaries of the response-time categorizer.

use ldaprate_core::{ManualClock, ResponseTimeCategorizer, StatTracker, LATENCY_BUCKETS};

const EDGES: [i64; 26] = [
    0,
    1_000_000,
    2_000_000,
    3_000_000,
    4_000_000,
    5_000_000,
    10_000_000,
    20_000_000,
    30_000_000,
    40_000_000,
    50_000_000,
    100_000_000,
    200_000_000,
    300_000_000,
    400_000_000,
    500_000_000,
    1_000_000_000,
    2_000_000_000,
    3_000_000_000,
    4_000_000_000,
    5_000_000_000,
    10_000_000_000,
    20_000_000_000,
    30_000_000_000,
    60_000_000_000,
    60_000_000_001,
];

#[test]
fn test_each_edge_lands_in_the_bucket_above() {
    let clock = ManualClock::shared(0);
    let mut categorizer = ResponseTimeCategorizer::new("client", "thread-0", 60, clock);
    categorizer.start();

    for &edge in &EDGES {
        categorizer.categorize(1_000, 1_000 + edge);
    }

    for bucket in &LATENCY_BUCKETS[..24] {
        assert_eq!(
            categorizer.counter().count(bucket.label),
            1,
            "bucket {}",
            bucket.label
        );
    }
    // 60 s and 60 s + 1 ns are both past the last boundary.
    assert_eq!(categorizer.counter().count("Longer Than 60s"), 2);
    assert_eq!(categorizer.counter().total(), 26);
}

#[test]
fn test_one_below_each_boundary_stays_in_lower_bucket() {
    let clock = ManualClock::shared(0);
    let mut categorizer = ResponseTimeCategorizer::new("client", "thread-0", 60, clock);
    categorizer.start();

    for &edge in &EDGES[1..25] {
        categorizer.categorize(0, edge - 1);
    }

    for bucket in &LATENCY_BUCKETS[..24] {
        assert_eq!(categorizer.counter().count(bucket.label), 1, "bucket {}", bucket.label);
    }
    assert_eq!(categorizer.counter().count("Longer Than 60s"), 0);
}

#[test]
fn test_snapshot_lists_buckets_in_first_seen_order() {
    let clock = ManualClock::shared(0);
    let mut categorizer = ResponseTimeCategorizer::new("client", "thread-0", 60, clock);
    categorizer.start();

    categorizer.categorize(0, 75_000_000);
    categorizer.categorize(0, 500);
    categorizer.categorize(0, 75_000_000);
    categorizer.stop();

    let snapshot = categorizer.snapshot();
    assert_eq!(snapshot.category_count("Between 50ms and 100ms"), 2);
    assert_eq!(snapshot.category_count("Less Than 1ms"), 1);
    assert_eq!(snapshot.descriptor.display_name, "Response Time Categories");
}
