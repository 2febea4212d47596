//! Attenuated signal test: flag a signal whose variability has collapsed.

use crate::error::{QcError, Result};
use crate::models::{Flag, finite};
use crate::qartod::{check_length, check_threshold, elapsed_seconds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    /// Population standard deviation
    #[default]
    Std,
    /// Maximum minus minimum
    Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttenuatedSignalParams {
    pub suspect_threshold: f64,
    pub fail_threshold: f64,
    #[serde(default)]
    pub check_type: CheckType,
    /// Trailing window length in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_period: Option<f64>,
    /// Trailing window length in samples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    /// Minimum number of valid values a window needs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_obs: Option<usize>,
}

impl AttenuatedSignalParams {
    pub fn validate(&self, location: &str) -> Result<()> {
        check_threshold(location, "suspect_threshold", self.suspect_threshold)?;
        check_threshold(location, "fail_threshold", self.fail_threshold)?;
        if self.fail_threshold > self.suspect_threshold {
            return Err(QcError::configuration(
                location,
                format!(
                    "fail_threshold {} exceeds suspect_threshold {}",
                    self.fail_threshold, self.suspect_threshold
                ),
            ));
        }
        match (self.test_period, self.window_size) {
            (Some(_), Some(_)) => {
                return Err(QcError::configuration(
                    location,
                    "test_period and window_size are mutually exclusive",
                ));
            }
            (Some(period), None) if !(period.is_finite() && period > 0.0) => {
                return Err(QcError::configuration(
                    format!("{}.test_period", location),
                    format!("must be a positive number of seconds, got {}", period),
                ));
            }
            (None, Some(0)) => {
                return Err(QcError::configuration(
                    format!("{}.window_size", location),
                    "must be at least 1",
                ));
            }
            _ => {}
        }
        Ok(())
    }

    fn classify(&self, statistic: f64) -> Flag {
        if statistic.is_nan() {
            Flag::NotEvaluated
        } else if statistic < self.fail_threshold {
            Flag::Fail
        } else if statistic < self.suspect_threshold {
            Flag::Suspect
        } else {
            Flag::Pass
        }
    }

    fn statistic(&self, window: &[f64]) -> Option<f64> {
        if window.len() < self.min_obs.unwrap_or(1).max(1) {
            return None;
        }
        let count = window.len() as f64;
        let value = match self.check_type {
            CheckType::Std => {
                let mean = window.iter().sum::<f64>() / count;
                (window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count).sqrt()
            }
            CheckType::Range => {
                let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let min = window.iter().copied().fold(f64::INFINITY, f64::min);
                max - min
            }
        };
        Some(value)
    }
}

/// Dispersion over a trailing window, or the whole series when no window is set
///
/// With `test_period` the window for point `i` holds samples no older than
/// `test_period` seconds, and points before `t[0] + test_period` are
/// NOT_EVALUATED. With `window_size` the first `window_size - 1` points are
/// NOT_EVALUATED.
pub fn attenuated_signal_test(
    values: &[Option<f64>],
    time: &[DateTime<Utc>],
    params: &AttenuatedSignalParams,
) -> Result<Vec<Flag>> {
    check_length("time", values.len(), time.len())?;
    let values: Vec<Option<f64>> = values.iter().map(|v| finite(*v)).collect();
    let n = values.len();

    let window_flag = |start: usize, end: usize| -> Flag {
        let window: Vec<f64> = values[start..end].iter().flatten().copied().collect();
        params
            .statistic(&window)
            .map_or(Flag::NotEvaluated, |s| params.classify(s))
    };

    let mut flags = Vec::with_capacity(n);
    match (params.test_period, params.window_size) {
        (Some(period), _) => {
            let mut start = 0;
            for i in 0..n {
                if elapsed_seconds(&time[0], &time[i]) < period {
                    flags.push(Flag::NotEvaluated);
                    continue;
                }
                while elapsed_seconds(&time[start], &time[i]) > period {
                    start += 1;
                }
                flags.push(window_flag(start, i + 1));
            }
        }
        (None, Some(size)) => {
            for i in 0..n {
                if i + 1 < size {
                    flags.push(Flag::NotEvaluated);
                } else {
                    flags.push(window_flag(i + 1 - size, i + 1));
                }
            }
        }
        (None, None) => {
            let whole = window_flag(0, n);
            flags.resize(n, whole);
        }
    }

    for (flag, value) in flags.iter_mut().zip(&values) {
        if value.is_none() {
            *flag = Flag::Missing;
        }
    }
    Ok(flags)
}
