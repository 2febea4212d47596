//! Spike test: compare each interior point with its neighbours.

use crate::error::{QcError, Result};
use crate::models::{Flag, finite};
use crate::qartod::check_threshold;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpikeMethod {
    /// Distance from the midpoint of the two neighbours
    #[default]
    Average,
    /// Smaller of the two one-sided jumps when they reverse direction
    Differential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpikeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspect_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_threshold: Option<f64>,
    #[serde(default)]
    pub method: SpikeMethod,
    /// Odd sample count of the centred window used to normalize deviations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize_window: Option<usize>,
}

impl SpikeParams {
    pub fn validate(&self, location: &str) -> Result<()> {
        if let Some(t) = self.suspect_threshold {
            check_threshold(location, "suspect_threshold", t)?;
        }
        if let Some(t) = self.fail_threshold {
            check_threshold(location, "fail_threshold", t)?;
        }
        if let (Some(suspect), Some(fail)) = (self.suspect_threshold, self.fail_threshold) {
            if suspect > fail {
                return Err(QcError::configuration(
                    location,
                    format!("suspect_threshold {} exceeds fail_threshold {}", suspect, fail),
                ));
            }
        }
        if let Some(window) = self.normalize_window {
            if window < 3 || window % 2 == 0 {
                return Err(QcError::configuration(
                    format!("{}.normalize_window", location),
                    format!("must be an odd count of at least 3, got {}", window),
                ));
            }
        }
        Ok(())
    }

    fn classify(&self, deviation: f64) -> Flag {
        if self.fail_threshold.is_some_and(|t| deviation > t) {
            Flag::Fail
        } else if self.suspect_threshold.is_some_and(|t| deviation > t) {
            Flag::Suspect
        } else {
            Flag::Pass
        }
    }
}

pub fn spike_test(values: &[Option<f64>], params: &SpikeParams) -> Vec<Flag> {
    let values: Vec<Option<f64>> = values.iter().map(|v| finite(*v)).collect();
    let n = values.len();

    let mut flags: Vec<Flag> = values
        .iter()
        .map(|v| if v.is_some() { Flag::NotEvaluated } else { Flag::Missing })
        .collect();

    for i in 1..n.saturating_sub(1) {
        let (Some(prev), Some(here), Some(next)) = (values[i - 1], values[i], values[i + 1]) else {
            continue;
        };

        let mut deviation = match params.method {
            SpikeMethod::Average => (here - (prev + next) / 2.0).abs(),
            SpikeMethod::Differential => {
                let (rise, fall) = (here - prev, next - here);
                if rise * fall < 0.0 {
                    rise.abs().min(fall.abs())
                } else {
                    0.0
                }
            }
        };

        if let Some(window) = params.normalize_window {
            let sd = centred_std(&values, i, window / 2);
            deviation = if sd > 0.0 {
                deviation / sd
            } else if deviation == 0.0 {
                0.0
            } else {
                f64::INFINITY
            };
        }

        flags[i] = params.classify(deviation);
    }
    flags
}

/// Population standard deviation of the valid values within `half` of `centre`
fn centred_std(values: &[Option<f64>], centre: usize, half: usize) -> f64 {
    let start = centre.saturating_sub(half);
    let end = (centre + half + 1).min(values.len());
    let window: Vec<f64> = values[start..end].iter().flatten().copied().collect();
    if window.is_empty() {
        return 0.0;
    }
    let count = window.len() as f64;
    let mean = window.iter().sum::<f64>() / count;
    (window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qartod::test_support::some;
    use Flag::*;

    fn params(suspect: f64, fail: f64) -> SpikeParams {
        SpikeParams {
            suspect_threshold: Some(suspect),
            fail_threshold: Some(fail),
            method: SpikeMethod::Average,
            normalize_window: None,
        }
    }

    #[test]
    fn test_endpoints_not_evaluated() {
        let flags = spike_test(&some(&[1.0, 1.0, 1.0, 1.0]), &params(1.0, 2.0));
        assert_eq!(flags, vec![NotEvaluated, Pass, Pass, NotEvaluated]);
    }

    #[test]
    fn test_average_method() {
        let flags = spike_test(&some(&[0.0, 1.5, 0.0, 3.0, 0.0, 0.0]), &params(1.0, 2.0));
        assert_eq!(flags[1], Suspect);
        assert_eq!(flags[3], Fail);
        assert_eq!(flags[4], Suspect);
    }

    #[test]
    fn test_differential_method_ignores_steps() {
        let mut p = params(1.0, 2.0);
        p.method = SpikeMethod::Differential;
        // A monotonic step is not a spike under the differential method
        let flags = spike_test(&some(&[0.0, 0.0, 5.0, 10.0, 10.0]), &p);
        assert_eq!(flags, vec![NotEvaluated, Pass, Pass, Pass, NotEvaluated]);

        let flags = spike_test(&some(&[0.0, 5.0, 1.0]), &p);
        assert_eq!(flags[1], Fail);
    }

    #[test]
    fn test_missing_neighbours() {
        let values = [Some(1.0), None, Some(1.0), Some(1.0), Some(f64::NAN)];
        let flags = spike_test(&values, &params(1.0, 2.0));
        assert_eq!(flags, vec![NotEvaluated, Missing, NotEvaluated, NotEvaluated, Missing]);
    }

    #[test]
    fn test_short_series() {
        assert!(spike_test(&[], &params(1.0, 2.0)).is_empty());
        assert_eq!(spike_test(&some(&[3.0]), &params(1.0, 2.0)), vec![NotEvaluated]);
        assert_eq!(spike_test(&some(&[3.0, 4.0]), &params(1.0, 2.0)), vec![NotEvaluated; 2]);
    }

    #[test]
    fn test_normalized_deviation() {
        let mut p = params(1.0, 1.5);
        p.normalize_window = Some(3);
        // window [0, 2, 0]: std 0.943, deviation 2 -> 2.12
        let flags = spike_test(&some(&[0.0, 2.0, 0.0]), &p);
        assert_eq!(flags[1], Fail);

        let flags = spike_test(&some(&[1.0, 1.0, 1.0]), &p);
        assert_eq!(flags[1], Pass);
    }

    #[test]
    fn test_validation() {
        assert!(params(1.0, 2.0).validate("t").is_ok());
        assert!(params(3.0, 2.0).validate("t").is_err());
        assert!(params(-1.0, 2.0).validate("t").is_err());
        let mut p = params(1.0, 2.0);
        p.normalize_window = Some(4);
        assert!(p.validate("t").is_err());
    }

    #[test]
    fn test_method_parses_lowercase() {
        let p: SpikeParams = serde_json::from_value(serde_json::json!({
            "suspect_threshold": 1, "fail_threshold": 2, "method": "differential"
        }))
        .unwrap();
        assert_eq!(p.method, SpikeMethod::Differential);
    }
}
