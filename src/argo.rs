//! Argo float profile checks.

use crate::error::{QcError, Result};
use crate::geo::haversine_m;
use crate::models::{Flag, finite};
use crate::qartod::{check_length, check_threshold, elapsed_seconds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PressureIncreasingParams {}

/// Flag pressures that do not strictly progress in the profile's dominant
/// direction (descending or ascending).
///
/// Each valid sample is compared with the previous valid one; the first is
/// PASS and missing samples are MISSING.
pub fn pressure_increasing_test(values: &[Option<f64>]) -> Vec<Flag> {
    let valid: Vec<f64> = values.iter().filter_map(|v| finite(*v)).collect();
    let net: f64 = valid.windows(2).map(|w| w[1] - w[0]).sum();
    let increasing = net >= 0.0;
    debug!("Pressure profile direction: {}", if increasing { "increasing" } else { "decreasing" });

    let mut previous: Option<f64> = None;
    values
        .iter()
        .map(|v| {
            let Some(p) = finite(*v) else {
                return Flag::Missing;
            };
            let flag = match previous {
                None => Flag::Pass,
                Some(prev) if (increasing && p > prev) || (!increasing && p < prev) => Flag::Pass,
                Some(_) => Flag::Suspect,
            };
            previous = Some(p);
            flag
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeedParams {
    /// Metres per second
    pub suspect_threshold: f64,
    /// Metres per second
    pub fail_threshold: f64,
}

impl SpeedParams {
    pub fn validate(&self, location: &str) -> Result<()> {
        check_threshold(location, "suspect_threshold", self.suspect_threshold)?;
        check_threshold(location, "fail_threshold", self.fail_threshold)?;
        if self.suspect_threshold > self.fail_threshold {
            return Err(QcError::configuration(
                location,
                format!(
                    "suspect_threshold {} exceeds fail_threshold {}",
                    self.suspect_threshold, self.fail_threshold
                ),
            ));
        }
        Ok(())
    }
}

/// Speed between consecutive positions in metres per second
///
/// The first position is NOT_EVALUATED, as is a position whose predecessor
/// is missing or shares its timestamp.
pub fn speed_test(
    lat: &[Option<f64>],
    lon: &[Option<f64>],
    time: &[DateTime<Utc>],
    params: &SpeedParams,
) -> Result<Vec<Flag>> {
    check_length("lon", lat.len(), lon.len())?;
    check_length("time", lat.len(), time.len())?;

    let positions: Vec<Option<(f64, f64)>> = lon
        .iter()
        .zip(lat)
        .map(|(x, y)| finite(*x).zip(finite(*y)))
        .collect();

    let flags = (0..positions.len())
        .map(|i| {
            let Some((x, y)) = positions[i] else {
                return Flag::Missing;
            };
            let Some(Some((px, py))) = i.checked_sub(1).map(|p| positions[p]) else {
                return Flag::NotEvaluated;
            };
            let seconds = elapsed_seconds(&time[i - 1], &time[i]);
            if seconds <= 0.0 {
                return Flag::NotEvaluated;
            }
            let speed = haversine_m(px, py, x, y) / seconds;
            if speed > params.fail_threshold {
                Flag::Fail
            } else if speed > params.suspect_threshold {
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
    use crate::qartod::test_support::{hourly, some};
    use Flag::*;

    #[test]
    fn test_pressure_descending_profile() {
        let flags = pressure_increasing_test(&some(&[0.0, 5.0, 10.0, 10.0, 9.0, 20.0]));
        assert_eq!(flags, vec![Pass, Pass, Pass, Suspect, Suspect, Pass]);
    }

    #[test]
    fn test_pressure_ascending_profile() {
        let pressure = [Some(100.0), Some(80.0), None, Some(85.0), Some(60.0)];
        let flags = pressure_increasing_test(&pressure);
        assert_eq!(flags, vec![Pass, Pass, Missing, Suspect, Pass]);
    }

    #[test]
    fn test_speed() {
        let params = SpeedParams {
            suspect_threshold: 1.0,
            fail_threshold: 3.0,
        };
        // 0.01 deg lat ~ 1112 m per hour ~ 0.31 m/s; 0.1 deg ~ 3.1 m/s
        let lat = vec![Some(0.0), Some(0.01), Some(0.05), Some(0.15), None, Some(0.15)];
        let lon = some(&[0.0; 6]);
        let flags = speed_test(&lat, &lon, &hourly(6), &params).unwrap();
        assert_eq!(flags, vec![NotEvaluated, Pass, Suspect, Fail, Missing, NotEvaluated]);
    }

    #[test]
    fn test_speed_validation() {
        let params = SpeedParams {
            suspect_threshold: 5.0,
            fail_threshold: 1.0,
        };
        assert!(params.validate("t").is_err());
    }
}
