//! Rate of change test: flag excessive change between consecutive samples.

use crate::error::Result;
use crate::models::{Flag, finite};
use crate::qartod::{check_length, check_threshold, elapsed_seconds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateOfChangeParams {
    /// Maximum allowed rate in value units per second
    pub threshold: f64,
}

impl RateOfChangeParams {
    pub fn validate(&self, location: &str) -> Result<()> {
        check_threshold(location, "threshold", self.threshold)
    }
}

/// Rate is `|v[i] - v[i-1]| / Δt` with Δt in seconds
///
/// The first point, points whose predecessor is missing and points that do
/// not advance in time are NOT_EVALUATED.
pub fn rate_of_change_test(
    values: &[Option<f64>],
    time: &[DateTime<Utc>],
    params: &RateOfChangeParams,
) -> Result<Vec<Flag>> {
    check_length("time", values.len(), time.len())?;

    let flags = (0..values.len())
        .map(|i| {
            let Some(here) = finite(values[i]) else {
                return Flag::Missing;
            };
            if i == 0 {
                return Flag::NotEvaluated;
            }
            let Some(prev) = finite(values[i - 1]) else {
                return Flag::NotEvaluated;
            };
            let seconds = elapsed_seconds(&time[i - 1], &time[i]);
            if seconds <= 0.0 {
                return Flag::NotEvaluated;
            }
            if (here - prev).abs() / seconds > params.threshold {
                Flag::Suspect
            } else {
                Flag::Pass
            }
        })
        .collect();
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qartod::test_support::{hourly, some, spaced};
    use Flag::*;
    use chrono::Duration;

    #[test]
    fn test_rate_of_change() {
        let params = RateOfChangeParams { threshold: 1.0 / 3600.0 };
        let flags = rate_of_change_test(&some(&[0.0, 0.5, 2.0, 2.5]), &hourly(4), &params).unwrap();
        assert_eq!(flags, vec![NotEvaluated, Pass, Suspect, Pass]);
    }

    #[test]
    fn test_time_scale_invariance() {
        let values = some(&[0.0, 1.0, 3.0, 3.5, 8.0]);
        let base = rate_of_change_test(
            &values,
            &spaced(5, Duration::seconds(10)),
            &RateOfChangeParams { threshold: 0.15 },
        )
        .unwrap();
        let scaled = rate_of_change_test(
            &values,
            &spaced(5, Duration::seconds(40)),
            &RateOfChangeParams { threshold: 0.15 / 4.0 },
        )
        .unwrap();
        assert_eq!(base, scaled);
    }

    #[test]
    fn test_missing_predecessor_and_duplicate_time() {
        let mut time = hourly(4);
        time[3] = time[2];
        let flags = rate_of_change_test(
            &[Some(1.0), None, Some(1.0), Some(1.0)],
            &time,
            &RateOfChangeParams { threshold: 1.0 },
        )
        .unwrap();
        assert_eq!(flags, vec![NotEvaluated, Missing, NotEvaluated, NotEvaluated]);
    }

    #[test]
    fn test_length_mismatch() {
        let params = RateOfChangeParams { threshold: 1.0 };
        let result = rate_of_change_test(&some(&[1.0, 2.0]), &hourly(3), &params);
        assert!(result.is_err());
    }
}
