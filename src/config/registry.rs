//! Static registry of the QC tests a configuration may name.
//!
//! Each `(module, test)` pair resolves to a [`TestKind`], which knows how to
//! parse and validate its parameters into a [`TestParams`] value and how that
//! value runs against a [`TestInput`].

use crate::argo::{self, PressureIncreasingParams, SpeedParams};
use crate::constants::modules;
use crate::error::{QcError, Result};
use crate::models::{Flag, TestInput};
use crate::qartod::{
    self, AttenuatedSignalParams, ClimatologyParams, DensityInversionParams, FlatLineParams,
    GrossRangeParams, LocationParams, RateOfChangeParams, SpikeParams,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
    GrossRange,
    Spike,
    RateOfChange,
    FlatLine,
    AttenuatedSignal,
    Climatology,
    Location,
    DensityInversion,
    Aggregate,
    PressureIncreasing,
    Speed,
}

struct TestEntry {
    kind: TestKind,
    module: &'static str,
    name: &'static str,
    standard_name: &'static str,
    long_name: &'static str,
}

const REGISTRY: &[TestEntry] = &[
    TestEntry {
        kind: TestKind::GrossRange,
        module: modules::QARTOD,
        name: "gross_range_test",
        standard_name: "gross_range_test_quality_flag",
        long_name: "Gross Range Test Quality Flag",
    },
    TestEntry {
        kind: TestKind::Spike,
        module: modules::QARTOD,
        name: "spike_test",
        standard_name: "spike_test_quality_flag",
        long_name: "Spike Test Quality Flag",
    },
    TestEntry {
        kind: TestKind::RateOfChange,
        module: modules::QARTOD,
        name: "rate_of_change_test",
        standard_name: "rate_of_change_test_quality_flag",
        long_name: "Rate of Change Test Quality Flag",
    },
    TestEntry {
        kind: TestKind::FlatLine,
        module: modules::QARTOD,
        name: "flat_line_test",
        standard_name: "flat_line_test_quality_flag",
        long_name: "Flat Line Test Quality Flag",
    },
    TestEntry {
        kind: TestKind::AttenuatedSignal,
        module: modules::QARTOD,
        name: "attenuated_signal_test",
        standard_name: "attenuated_signal_test_quality_flag",
        long_name: "Attenuated Signal Test Quality Flag",
    },
    TestEntry {
        kind: TestKind::Climatology,
        module: modules::QARTOD,
        name: "climatology_test",
        standard_name: "climatology_test_quality_flag",
        long_name: "Climatology Test Quality Flag",
    },
    TestEntry {
        kind: TestKind::Location,
        module: modules::QARTOD,
        name: "location_test",
        standard_name: "location_test_quality_flag",
        long_name: "Location Test Quality Flag",
    },
    TestEntry {
        kind: TestKind::DensityInversion,
        module: modules::QARTOD,
        name: "density_inversion_test",
        standard_name: "density_inversion_test_quality_flag",
        long_name: "Density Inversion Test Quality Flag",
    },
    TestEntry {
        kind: TestKind::Aggregate,
        module: modules::QARTOD,
        name: "aggregate",
        standard_name: "aggregate_quality_flag",
        long_name: "Aggregate Quality Flag",
    },
    TestEntry {
        kind: TestKind::PressureIncreasing,
        module: modules::ARGO,
        name: "pressure_increasing_test",
        standard_name: "pressure_increasing_test_quality_flag",
        long_name: "Pressure Increasing Test Quality Flag",
    },
    TestEntry {
        kind: TestKind::Speed,
        module: modules::ARGO,
        name: "speed_test",
        standard_name: "speed_test_quality_flag",
        long_name: "Speed Test Quality Flag",
    },
];

impl TestKind {
    pub fn all() -> impl Iterator<Item = TestKind> {
        REGISTRY.iter().map(|entry| entry.kind)
    }

    fn entry(self) -> &'static TestEntry {
        // Rows follow variant declaration order
        &REGISTRY[self as usize]
    }

    /// Resolve a configured `module.test` pair
    pub fn from_path(module: &str, test: &str) -> Result<Self> {
        REGISTRY
            .iter()
            .find(|entry| entry.module == module && entry.name == test)
            .map(|entry| entry.kind)
            .ok_or_else(|| QcError::UnknownTest {
                module: module.to_string(),
                test: test.to_string(),
            })
    }

    pub fn module(self) -> &'static str {
        self.entry().module
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn standard_name(self) -> &'static str {
        self.entry().standard_name
    }

    pub fn long_name(self) -> &'static str {
        self.entry().long_name
    }

    pub fn is_aggregate(self) -> bool {
        self == TestKind::Aggregate
    }

    /// Deserialize and validate parameters; `location` names the config path
    pub fn parse_params(self, value: &Value, location: &str) -> Result<TestParams> {
        let params = match self {
            TestKind::GrossRange => {
                let p: GrossRangeParams = deserialize(value, location)?;
                p.validate(location)?;
                TestParams::GrossRange(p)
            }
            TestKind::Spike => {
                let p: SpikeParams = deserialize(value, location)?;
                p.validate(location)?;
                TestParams::Spike(p)
            }
            TestKind::RateOfChange => {
                let p: RateOfChangeParams = deserialize(value, location)?;
                p.validate(location)?;
                TestParams::RateOfChange(p)
            }
            TestKind::FlatLine => {
                let p: FlatLineParams = deserialize(value, location)?;
                p.validate(location)?;
                TestParams::FlatLine(p)
            }
            TestKind::AttenuatedSignal => {
                let p: AttenuatedSignalParams = deserialize(value, location)?;
                p.validate(location)?;
                TestParams::AttenuatedSignal(p)
            }
            TestKind::Climatology => {
                let p: ClimatologyParams = deserialize(value, location)?;
                p.validate(location)?;
                TestParams::Climatology(p)
            }
            TestKind::Location => {
                let p: LocationParams = deserialize(value, location)?;
                p.validate(location)?;
                TestParams::Location(p)
            }
            TestKind::DensityInversion => {
                let p: DensityInversionParams = deserialize(value, location)?;
                p.validate(location)?;
                TestParams::DensityInversion(p)
            }
            TestKind::Aggregate => {
                if !is_empty_params(value) {
                    return Err(QcError::configuration(location, "aggregate takes no parameters"));
                }
                TestParams::Aggregate
            }
            TestKind::PressureIncreasing => {
                let _: PressureIncreasingParams = deserialize(value, location)?;
                TestParams::PressureIncreasing
            }
            TestKind::Speed => {
                let p: SpeedParams = deserialize(value, location)?;
                p.validate(location)?;
                TestParams::Speed(p)
            }
        };
        Ok(params)
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module(), self.name())
    }
}

fn is_empty_params(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn deserialize<T: DeserializeOwned>(value: &Value, location: &str) -> Result<T> {
    let value = match value {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| QcError::configuration(location, e.to_string()))
}

/// Validated parameters of one configured test
#[derive(Debug, Clone, PartialEq)]
pub enum TestParams {
    GrossRange(GrossRangeParams),
    Spike(SpikeParams),
    RateOfChange(RateOfChangeParams),
    FlatLine(FlatLineParams),
    AttenuatedSignal(AttenuatedSignalParams),
    Climatology(ClimatologyParams),
    Location(LocationParams),
    DensityInversion(DensityInversionParams),
    Aggregate,
    PressureIncreasing,
    Speed(SpeedParams),
}

impl TestParams {
    pub fn kind(&self) -> TestKind {
        match self {
            TestParams::GrossRange(_) => TestKind::GrossRange,
            TestParams::Spike(_) => TestKind::Spike,
            TestParams::RateOfChange(_) => TestKind::RateOfChange,
            TestParams::FlatLine(_) => TestKind::FlatLine,
            TestParams::AttenuatedSignal(_) => TestKind::AttenuatedSignal,
            TestParams::Climatology(_) => TestKind::Climatology,
            TestParams::Location(_) => TestKind::Location,
            TestParams::DensityInversion(_) => TestKind::DensityInversion,
            TestParams::Aggregate => TestKind::Aggregate,
            TestParams::PressureIncreasing => TestKind::PressureIncreasing,
            TestParams::Speed(_) => TestKind::Speed,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        fn encode<T: Serialize>(params: &T) -> Result<Value> {
            Ok(serde_json::to_value(params)?)
        }
        match self {
            TestParams::GrossRange(p) => encode(p),
            TestParams::Spike(p) => encode(p),
            TestParams::RateOfChange(p) => encode(p),
            TestParams::FlatLine(p) => encode(p),
            TestParams::AttenuatedSignal(p) => encode(p),
            TestParams::Climatology(p) => encode(p),
            TestParams::Location(p) => encode(p),
            TestParams::DensityInversion(p) => encode(p),
            TestParams::Aggregate | TestParams::PressureIncreasing => Ok(Value::Object(Map::new())),
            TestParams::Speed(p) => encode(p),
        }
    }

    /// Run the test over one stream's samples
    ///
    /// `aggregate` works on other tests' flags and is handled by the result
    /// cursor, so calling it here is an error.
    pub fn run(&self, input: &TestInput<'_>) -> Result<Vec<Flag>> {
        let name = self.kind().name();
        match self {
            TestParams::GrossRange(p) => Ok(qartod::gross_range_test(input.values, p)),
            TestParams::Spike(p) => Ok(qartod::spike_test(input.values, p)),
            TestParams::RateOfChange(p) => {
                qartod::rate_of_change_test(input.values, input.require_time(name)?, p)
            }
            TestParams::FlatLine(p) => {
                qartod::flat_line_test(input.values, input.require_time(name)?, p)
            }
            TestParams::AttenuatedSignal(p) => {
                qartod::attenuated_signal_test(input.values, input.require_time(name)?, p)
            }
            TestParams::Climatology(p) => {
                qartod::climatology_test(input.values, input.require_time(name)?, input.depth, p)
            }
            TestParams::Location(p) => {
                let (lat, lon) = input.require_position(name)?;
                qartod::location_test(lat, lon, p)
            }
            TestParams::DensityInversion(p) => {
                qartod::density_inversion_test(input.values, input.require_depth(name)?, p)
            }
            TestParams::Aggregate => Err(QcError::configuration(
                name,
                "aggregate is computed from the other tests of a stream",
            )),
            TestParams::PressureIncreasing => Ok(argo::pressure_increasing_test(input.values)),
            TestParams::Speed(p) => {
                let (lat, lon) = input.require_position(name)?;
                argo::speed_test(lat, lon, input.require_time(name)?, p)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_kind_round_trips_through_its_path() {
        for (row, kind) in TestKind::all().enumerate() {
            assert_eq!(kind as usize, row);
            assert_eq!(TestKind::from_path(kind.module(), kind.name()).unwrap(), kind);
            assert!(kind.standard_name().ends_with("_flag"));
        }
        assert_eq!(TestKind::all().count(), 11);
    }

    #[test]
    fn test_unknown_test_rejected() {
        let err = TestKind::from_path("qartod", "bogus_test").unwrap_err();
        assert!(matches!(err, QcError::UnknownTest { .. }));
        assert!(TestKind::from_path("argo", "gross_range_test").is_err());
    }

    #[test]
    fn test_display_path() {
        assert_eq!(TestKind::Spike.to_string(), "qartod.spike_test");
        assert_eq!(TestKind::Speed.to_string(), "argo.speed_test");
    }

    #[test]
    fn test_aggregate_accepts_only_empty_params() {
        let location = "temp.qartod.aggregate";
        assert_eq!(
            TestKind::Aggregate.parse_params(&Value::Null, location).unwrap(),
            TestParams::Aggregate
        );
        assert!(TestKind::Aggregate.parse_params(&json!({}), location).is_ok());
        assert!(TestKind::Aggregate.parse_params(&json!({"x": 1}), location).is_err());
    }

    #[test]
    fn test_parse_error_names_location() {
        let value = json!({"fail_span": [0, 1], "extra": true});
        let err = TestKind::GrossRange
            .parse_params(&value, "temp.qartod.gross_range_test")
            .unwrap_err();
        assert!(err.to_string().contains("temp.qartod.gross_range_test"));
    }

    #[test]
    fn test_params_to_value_reparses() {
        let value =
            json!({"suspect_threshold": 1.0, "fail_threshold": 2.0, "method": "differential"});
        let params = TestKind::Spike.parse_params(&value, "x").unwrap();
        let again = TestKind::Spike.parse_params(&params.to_value().unwrap(), "x").unwrap();
        assert_eq!(params, again);
    }

    #[test]
    fn test_run_requires_axes() {
        let params = TestKind::RateOfChange.parse_params(&json!({"threshold": 1.0}), "x").unwrap();
        let values = [Some(1.0)];
        let err = params.run(&TestInput::values(&values)).unwrap_err();
        assert!(matches!(err, QcError::MissingAxis { .. }));

        let params = TestKind::GrossRange.parse_params(&json!({"fail_span": [0, 2]}), "x").unwrap();
        assert_eq!(params.run(&TestInput::values(&values)).unwrap(), vec![Flag::Pass]);
    }
}
