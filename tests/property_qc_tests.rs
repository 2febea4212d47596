//! Property-based tests for the QC test library
//!
//! Invariants that should hold for any series:
//! - Every registered test yields exactly one flag per sample
//! - The aggregate flag is the most severe flag of the other tests
//! - Rate of change depends on rates, not on the time unit

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use qartod_qc::qartod::{RateOfChangeParams, rate_of_change_test};
use qartod_qc::streams::ArrayStream;
use qartod_qc::{Config, Flag, StreamSource, TestKind, collect_results};
use serde_json::{Map, Value, json};

/// Parameters that pass validation for each kind of test
fn params_for(kind: TestKind) -> Value {
    match kind {
        TestKind::GrossRange => json!({"fail_span": [-40, 40], "suspect_span": [-20, 20]}),
        TestKind::Spike => json!({"suspect_threshold": 5, "fail_threshold": 10}),
        TestKind::RateOfChange => json!({"threshold": 0.01}),
        TestKind::FlatLine => {
            json!({"suspect_threshold": 3600, "fail_threshold": 7200, "tolerance": 0.01})
        }
        TestKind::AttenuatedSignal => {
            json!({"suspect_threshold": 5, "fail_threshold": 1, "window_size": 4})
        }
        TestKind::Climatology => json!({
            "period": "month",
            "config": [{"tspan": [1, 12], "suspect_span": [-10, 10], "fail_span": [-30, 30]}]
        }),
        TestKind::Location => json!({"bbox": [-80, 30, -60, 50], "range_max": 50000}),
        TestKind::DensityInversion => json!({"suspect_threshold": 0.03, "fail_threshold": 0.05}),
        TestKind::Aggregate => json!({}),
        TestKind::PressureIncreasing => json!({}),
        TestKind::Speed => json!({"suspect_threshold": 1, "fail_threshold": 3}),
    }
}

/// One stream configured with every registered test
fn full_config() -> Config {
    let mut modules = Map::new();
    for kind in TestKind::all() {
        let module = modules
            .entry(kind.module())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(tests) = module {
            tests.insert(kind.name().to_string(), params_for(kind));
        }
    }
    Config::from_value(&json!({"temp": Value::Object(modules)})).unwrap()
}

fn times(start: DateTime<Utc>, steps: &[i64]) -> Vec<DateTime<Utc>> {
    let mut time = Vec::with_capacity(steps.len());
    let mut current = start;
    for step in steps {
        current += Duration::seconds(*step);
        time.push(current);
    }
    time
}

fn value() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        8 => (-50.0..50.0f64).prop_map(Some),
        1 => Just(None),
        1 => Just(Some(f64::NAN)),
    ]
}

fn coordinate(low: f64, high: f64) -> impl Strategy<Value = Option<f64>> {
    prop_oneof![9 => (low..high).prop_map(Some), 1 => Just(None)]
}

/// Values with strictly increasing sample times
fn series() -> impl Strategy<Value = (Vec<Option<f64>>, Vec<i64>)> {
    (1usize..60).prop_flat_map(|n| {
        (
            prop::collection::vec(value(), n),
            prop::collection::vec(1i64..7200, n),
        )
    })
}

proptest! {
    #[test]
    fn prop_every_test_keeps_series_length(
        (values, steps) in series(),
        seed in any::<u64>(),
    ) {
        let n = values.len();
        let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let time = times(start, &steps);
        let depth: Vec<Option<f64>> = (0..n).map(|i| Some(i as f64 * 2.0)).collect();
        let lat: Vec<Option<f64>> = (0..n)
            .map(|i| Some(40.0 + ((seed >> (i % 64)) & 1) as f64 * 0.01 * i as f64))
            .collect();
        let lon: Vec<Option<f64>> = (0..n).map(|i| Some(-70.0 - 0.001 * i as f64)).collect();

        let source = ArrayStream::new(time)
            .with_depth(depth)
            .unwrap()
            .with_position(lat, lon)
            .unwrap()
            .with_variable("temp", values)
            .unwrap()
            .without_timestamp_checks();

        let collected = collect_results(source.run(&full_config())).unwrap();
        prop_assert_eq!(collected.len(), TestKind::all().count());
        for kind in TestKind::all() {
            let result = collected.iter().find(|c| c.test == kind.name());
            prop_assert!(result.is_some(), "no result for {}", kind);
            prop_assert_eq!(result.map(|r| r.flags.len()), Some(n));
        }
    }

    #[test]
    fn prop_aggregate_is_most_severe_flag(
        values in prop::collection::vec(value(), 1..80),
    ) {
        let config = Config::from_value(&json!({"temp": {"qartod": {
            "gross_range_test": params_for(TestKind::GrossRange),
            "spike_test": params_for(TestKind::Spike),
            "aggregate": {}
        }}}))
        .unwrap();
        let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let time: Vec<_> = (0..values.len() as i64).map(|i| start + Duration::minutes(i)).collect();
        let source = ArrayStream::new(time).with_variable("temp", values).unwrap();

        let collected = collect_results(source.run(&config)).unwrap();
        let (aggregate, others): (Vec<_>, Vec<_>) = collected
            .iter()
            .partition(|c| c.test == TestKind::Aggregate.name());
        prop_assert_eq!(aggregate.len(), 1);
        for (i, flag) in aggregate[0].flags.iter().enumerate() {
            let expected = others.iter().map(|c| c.flags[i]).max().unwrap_or(Flag::NotEvaluated);
            prop_assert_eq!(*flag, expected);
        }
    }

    #[test]
    fn prop_rate_of_change_ignores_time_unit(
        (values, steps) in series(),
        threshold in 0.0001..1.0f64,
        shift in 1u32..5,
    ) {
        let factor = 2i64.pow(shift);
        let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let time = times(start, &steps);
        let stretched: Vec<i64> = steps.iter().map(|s| s * factor).collect();
        let slow = times(start, &stretched);

        let flags = rate_of_change_test(&values, &time, &RateOfChangeParams { threshold }).unwrap();
        let scaled = RateOfChangeParams { threshold: threshold / factor as f64 };
        let slow_flags = rate_of_change_test(&values, &slow, &scaled).unwrap();
        prop_assert_eq!(flags, slow_flags);
    }
}
