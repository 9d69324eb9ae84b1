use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use vigil_core::{RawResult, TelemetryConfig};
use vigil_telemetry::Aggregator;

fn raw_result() -> impl Strategy<Value = RawResult> {
    (
        0u64..500,
        0u64..500,
        0.0f64..2_000.0,
        proptest::collection::vec("r[0-9]", 0..4),
        proptest::collection::vec("case[0-5]", 0..4),
    )
        .prop_map(|(passed, failed, latency, regressions, fail_cases)| {
            RawResult::new(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(), passed, failed)
                .with_latency(latency)
                .with_regressions(regressions)
                .with_fail_cases(fail_cases)
        })
}

proptest! {
    #[test]
    fn rates_stay_in_unit_interval(results in proptest::collection::vec(raw_result(), 1..25)) {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let doc = Aggregator::default().aggregate(&results, now).unwrap();

        prop_assert!((0.0..=1.0).contains(&doc.pass_rate));
        prop_assert!((0.0..=1.0).contains(&doc.reliability_score));
        prop_assert!((0.0..=1.0).contains(&doc.error_rate));
        prop_assert_eq!(doc.test_count, doc.tests_passed + doc.tests_failed);
        prop_assert!(doc.top_fail_cases.len() <= 5);
        prop_assert!(doc.regressions.len() <= 10);
        prop_assert!(doc.regressions.len() as u64 <= doc.regression_count);
        if doc.test_count > 0 {
            prop_assert!((doc.pass_rate + doc.error_rate - 1.0).abs() <= 0.002);
        }
    }

    #[test]
    fn aggregation_is_deterministic(results in proptest::collection::vec(raw_result(), 1..15)) {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let aggregator = Aggregator::new(&TelemetryConfig::default());

        let first = aggregator.aggregate(&results, now).unwrap();
        let second = aggregator.aggregate(&results, now).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.clone().merged_onto(Some(second)), first);
    }

    #[test]
    fn sample_size_bounds_the_input(results in proptest::collection::vec(raw_result(), 1..25), size in 1usize..12) {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let config = TelemetryConfig { sample_size: size, ..TelemetryConfig::default() };
        let doc = Aggregator::new(&config).aggregate(&results, now).unwrap();

        let expected: u64 = results.iter().take(size).map(|r| r.tests_passed + r.tests_failed).sum();
        prop_assert_eq!(doc.test_count, expected);
    }
}

#[test]
fn document_serializes_with_stored_field_names() {
    let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
    let doc = Aggregator::default()
        .aggregate(&[RawResult::new(now, 9, 1).with_latency(420.4)], now)
        .unwrap();

    let json = serde_json::to_value(&doc).unwrap();
    assert_eq!(json["date"], "2026-02-01");
    assert_eq!(json["passRate"], 0.9);
    assert_eq!(json["copilotReliability"], 0.9);
    assert_eq!(json["avgLatency"], 420.0);
    assert_eq!(json["regressionCount"], 0);
}
