//! Flat line test: detect runs of (nearly) invariant values.

use crate::error::{QcError, Result};
use crate::models::{Flag, finite};
use crate::qartod::{check_length, check_threshold, elapsed_seconds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlatLineParams {
    /// Seconds a run may last before it is SUSPECT
    pub suspect_threshold: f64,
    /// Seconds a run may last before it FAILs
    pub fail_threshold: f64,
    /// Largest value range still considered flat
    #[serde(default)]
    pub tolerance: f64,
}

impl FlatLineParams {
    pub fn validate(&self, location: &str) -> Result<()> {
        check_threshold(location, "suspect_threshold", self.suspect_threshold)?;
        check_threshold(location, "fail_threshold", self.fail_threshold)?;
        check_threshold(location, "tolerance", self.tolerance)?;
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

/// For each valid point, find the earliest valid sample such that every
/// valid value between it and the point lies within `tolerance`, and flag
/// by the time elapsed since that sample.
///
/// Missing samples are flagged MISSING and skipped; they do not break a run.
pub fn flat_line_test(
    values: &[Option<f64>],
    time: &[DateTime<Utc>],
    params: &FlatLineParams,
) -> Result<Vec<Flag>> {
    check_length("time", values.len(), time.len())?;

    let mut flags = vec![Flag::Missing; values.len()];
    let valid: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| finite(*v).map(|v| (i, v)))
        .collect();

    // Monotonic deques of positions in `valid`
    let mut maxima: VecDeque<usize> = VecDeque::new();
    let mut minima: VecDeque<usize> = VecDeque::new();
    let mut start = 0;

    for (k, &(index, value)) in valid.iter().enumerate() {
        while maxima.back().is_some_and(|&b| valid[b].1 <= value) {
            maxima.pop_back();
        }
        maxima.push_back(k);
        while minima.back().is_some_and(|&b| valid[b].1 >= value) {
            minima.pop_back();
        }
        minima.push_back(k);

        while let (Some(&hi), Some(&lo)) = (maxima.front(), minima.front()) {
            if valid[hi].1 - valid[lo].1 <= params.tolerance {
                break;
            }
            start += 1;
            if hi < start {
                maxima.pop_front();
            }
            if lo < start {
                minima.pop_front();
            }
        }

        let elapsed = elapsed_seconds(&time[valid[start].0], &time[index]);
        flags[index] = if elapsed > params.fail_threshold {
            Flag::Fail
        } else if elapsed > params.suspect_threshold {
            Flag::Suspect
        } else {
            Flag::Pass
        };
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qartod::test_support::{hourly, some};
    use Flag::*;

    fn params(tolerance: f64) -> FlatLineParams {
        FlatLineParams {
            suspect_threshold: 2.0 * 3600.0,
            fail_threshold: 4.0 * 3600.0,
            tolerance,
        }
    }

    #[test]
    fn test_flat_run_from_start_is_flagged() {
        let values = some(&[5.0; 7]);
        let flags = flat_line_test(&values, &hourly(7), &params(0.0)).unwrap();
        assert_eq!(flags, vec![Pass, Pass, Pass, Suspect, Suspect, Fail, Fail]);
    }

    #[test]
    fn test_varying_series_passes() {
        let values = some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let flags = flat_line_test(&values, &hourly(6), &params(0.5)).unwrap();
        assert!(flags.iter().all(|f| *f == Pass));
    }

    #[test]
    fn test_tolerance_window_restarts() {
        let values = some(&[1.0, 1.1, 1.0, 1.1, 3.0, 3.05, 3.0, 3.0]);
        let flags = flat_line_test(&values, &hourly(8), &params(0.2)).unwrap();
        assert_eq!(flags, vec![Pass, Pass, Pass, Suspect, Pass, Pass, Pass, Suspect]);
    }

    #[test]
    fn test_missing_values_do_not_break_run() {
        let values = vec![Some(2.0), Some(2.0), None, Some(2.0), Some(f64::NAN), Some(2.0)];
        let flags = flat_line_test(&values, &hourly(6), &params(0.0)).unwrap();
        assert_eq!(flags, vec![Pass, Pass, Missing, Suspect, Missing, Fail]);
    }

    #[test]
    fn test_validation() {
        assert!(params(0.0).validate("t").is_ok());
        let inverted = FlatLineParams {
            suspect_threshold: 10.0,
            fail_threshold: 5.0,
            tolerance: 0.0,
        };
        assert!(inverted.validate("t").is_err());
    }
}
