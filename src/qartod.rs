//! QARTOD test library
//!
//! Every test is a pure function producing exactly one [`Flag`] per input
//! sample. Missing or NaN samples become `Flag::Missing` before any numeric
//! work; length mismatches between value and axis slices are reported as
//! [`QcError::LengthMismatch`].

pub mod attenuated_signal;
pub mod climatology;
pub mod density_inversion;
pub mod flat_line;
pub mod gross_range;
pub mod location;
pub mod rate_of_change;
pub mod spike;

pub use attenuated_signal::{AttenuatedSignalParams, CheckType, attenuated_signal_test};
pub use climatology::{ClimatologyEntry, ClimatologyParams, Period, climatology_test};
pub use density_inversion::{DensityInversionParams, density_inversion_test};
pub use flat_line::{FlatLineParams, flat_line_test};
pub use gross_range::{GrossRangeParams, gross_range_test};
pub use location::{LocationParams, location_test};
pub use rate_of_change::{RateOfChangeParams, rate_of_change_test};
pub use spike::{SpikeMethod, SpikeParams, spike_test};

use crate::error::{QcError, Result};
use crate::models::Flag;
use chrono::{DateTime, Duration, Utc};

/// Roll up the flags of several tests for one point
///
/// MISSING if any contributor is MISSING, otherwise the most severe flag.
/// An empty input, or one made only of NOT_EVALUATED, is NOT_EVALUATED.
pub fn aggregate(flags: &[Flag]) -> Flag {
    flags.iter().copied().max().unwrap_or(Flag::NotEvaluated)
}

/// Point-wise [`aggregate`] over equally long flag series
pub fn aggregate_series(series: &[&[Flag]]) -> Result<Vec<Flag>> {
    let Some(first) = series.first() else {
        return Ok(Vec::new());
    };
    for other in series {
        check_length("aggregated flags", first.len(), other.len())?;
    }
    Ok((0..first.len())
        .map(|i| series.iter().map(|s| s[i]).max().unwrap_or(Flag::NotEvaluated))
        .collect())
}

pub(crate) fn check_length(what: &str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(QcError::length_mismatch(what, expected, found));
    }
    Ok(())
}

pub(crate) fn elapsed_seconds(from: &DateTime<Utc>, to: &DateTime<Utc>) -> f64 {
    let delta = *to - *from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

pub(crate) fn check_threshold(location: &str, name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(QcError::configuration(
            format!("{}.{}", location, name),
            format!("must be a non-negative number, got {}", value),
        ));
    }
    Ok(())
}

/// Sanity report on a time axis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampReport {
    /// Indexes whose timestamp is earlier than the previous one
    pub decreasing: Vec<usize>,
    /// Indexes whose timestamp repeats the previous one
    pub duplicates: Vec<usize>,
    /// Indexes preceded by a gap larger than the requested maximum
    pub gaps: Vec<usize>,
}

impl TimestampReport {
    pub fn is_monotonic(&self) -> bool {
        self.decreasing.is_empty() && self.duplicates.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.is_monotonic() && self.gaps.is_empty()
    }
}

/// Check that a time axis is strictly increasing, optionally without large gaps
pub fn check_timestamps(time: &[DateTime<Utc>], max_gap: Option<Duration>) -> TimestampReport {
    let mut report = TimestampReport::default();
    for (i, pair) in time.windows(2).enumerate() {
        let delta = pair[1] - pair[0];
        if delta < Duration::zero() {
            report.decreasing.push(i + 1);
        } else if delta == Duration::zero() {
            report.duplicates.push(i + 1);
        } else if max_gap.is_some_and(|gap| delta > gap) {
            report.gaps.push(i + 1);
        }
    }
    report
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    pub fn hourly(n: usize) -> Vec<DateTime<Utc>> {
        spaced(n, Duration::hours(1))
    }

    pub fn spaced(n: usize, step: Duration) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + step * i as i32).collect()
    }

    pub fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| Some(*v)).collect()
    }
}
