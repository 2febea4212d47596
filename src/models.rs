//! Core data structures and types for QC evaluation.
//!
//! Defines the QARTOD flag algebra, spans, time windows and the sample
//! sequences every test and adapter operates on.

use crate::constants::flag_values;
use crate::error::{QcError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// QARTOD primary flag
///
/// Encoded with the canonical numeric values (PASS=1 ... MISSING=9). The
/// ordering implemented here is the aggregation severity, not the numeric
/// value: `NotEvaluated < Pass < Suspect < Fail < Missing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Flag {
    Pass = flag_values::PASS,
    NotEvaluated = flag_values::NOT_EVALUATED,
    Suspect = flag_values::SUSPECT,
    Fail = flag_values::FAIL,
    Missing = flag_values::MISSING,
}

impl Flag {
    /// Rank used for aggregation precedence
    pub fn severity(self) -> u8 {
        match self {
            Flag::NotEvaluated => 0,
            Flag::Pass => 1,
            Flag::Suspect => 2,
            Flag::Fail => 3,
            Flag::Missing => 4,
        }
    }

    /// Canonical numeric value
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        crate::constants::flag_description(self as u8)
    }
}

impl Ord for Flag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity().cmp(&other.severity())
    }
}

impl PartialOrd for Flag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<u8> for Flag {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            flag_values::PASS => Ok(Flag::Pass),
            flag_values::NOT_EVALUATED => Ok(Flag::NotEvaluated),
            flag_values::SUSPECT => Ok(Flag::Suspect),
            flag_values::FAIL => Ok(Flag::Fail),
            flag_values::MISSING => Ok(Flag::Missing),
            _ => Err(format!(
                "Invalid flag value {}: must be 1, 2, 3, 4, or 9",
                value
            )),
        }
    }
}

impl From<Flag> for u8 {
    fn from(flag: Flag) -> Self {
        flag as u8
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flag::Pass => "PASS",
            Flag::NotEvaluated => "NOT_EVALUATED",
            Flag::Suspect => "SUSPECT",
            Flag::Fail => "FAIL",
            Flag::Missing => "MISSING",
        };
        f.write_str(name)
    }
}

/// Inclusive `[low, high]` interval used by threshold-style tests
///
/// Deserialized from a two-element array. Ordering is checked by
/// [`Span::validate`] when the owning configuration is built, never by
/// silently swapping the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Span {
    pub low: f64,
    pub high: f64,
}

impl Span {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    /// True when `other` lies entirely inside this span
    pub fn encloses(&self, other: &Span) -> bool {
        other.low >= self.low && other.high <= self.high
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.low <= other.high && other.low <= self.high
    }

    pub fn validate(&self, location: &str) -> Result<()> {
        if self.low.is_nan() || self.high.is_nan() || self.low > self.high {
            return Err(QcError::InvalidSpan {
                location: location.to_string(),
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

impl From<[f64; 2]> for Span {
    fn from([low, high]: [f64; 2]) -> Self {
        Self { low, high }
    }
}

impl From<Span> for [f64; 2] {
    fn from(span: Span) -> Self {
        [span.low, span.high]
    }
}

/// Time window of a context; `starting` is inclusive, `ending` exclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeWindow {
    #[serde(default, with = "optional_timestamp")]
    pub starting: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_timestamp")]
    pub ending: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(starting: Option<DateTime<Utc>>, ending: Option<DateTime<Utc>>) -> Self {
        Self { starting, ending }
    }

    pub fn is_unbounded(&self) -> bool {
        self.starting.is_none() && self.ending.is_none()
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        self.starting.is_none_or(|start| *time >= start)
            && self.ending.is_none_or(|end| *time < end)
    }

    pub fn validate(&self, location: &str) -> Result<()> {
        if let (Some(start), Some(end)) = (self.starting, self.ending) {
            if start >= end {
                return Err(QcError::configuration(
                    location,
                    format!("window starting {} is not before ending {}", start, end),
                ));
            }
        }
        Ok(())
    }
}

/// Parse an ISO-8601 timestamp
///
/// Accepts RFC 3339, naive date-times and plain dates; naive forms are
/// interpreted as UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    let date = NaiveDate::from_str(text)?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
}

mod optional_timestamp {
    use super::parse_timestamp;
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => {
                serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|t| parse_timestamp(&t).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Normalise a sample value, treating NaN and infinities as missing
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// A time-ordered sequence of samples with optional parallel axes
///
/// `values` entries of `None` (or NaN) are missing observations. Time must be
/// non-decreasing for rate and window based tests; this is not enforced, see
/// [`crate::qartod::check_timestamps`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Samples {
    pub time: Vec<DateTime<Utc>>,
    pub values: Vec<Option<f64>>,
    pub depth: Option<Vec<Option<f64>>>,
    pub lat: Option<Vec<Option<f64>>>,
    pub lon: Option<Vec<Option<f64>>>,
}

impl Samples {
    pub fn new(time: Vec<DateTime<Utc>>, values: Vec<Option<f64>>) -> Result<Self> {
        if time.len() != values.len() {
            return Err(QcError::length_mismatch("time", values.len(), time.len()));
        }
        Ok(Self {
            time,
            values,
            depth: None,
            lat: None,
            lon: None,
        })
    }

    pub fn with_depth(mut self, depth: Vec<Option<f64>>) -> Result<Self> {
        self.check_axis("depth", depth.len())?;
        self.depth = Some(depth);
        Ok(self)
    }

    pub fn with_position(mut self, lat: Vec<Option<f64>>, lon: Vec<Option<f64>>) -> Result<Self> {
        self.check_axis("lat", lat.len())?;
        self.check_axis("lon", lon.len())?;
        self.lat = Some(lat);
        self.lon = Some(lon);
        Ok(self)
    }

    fn check_axis(&self, axis: &str, found: usize) -> Result<()> {
        if found != self.values.len() {
            return Err(QcError::length_mismatch(axis, self.values.len(), found));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy the samples at `indexes`, keeping every axis aligned
    pub fn subset(&self, indexes: &[usize]) -> Samples {
        let pick = |axis: &Vec<Option<f64>>| indexes.iter().map(|&i| axis[i]).collect();
        Samples {
            time: indexes.iter().map(|&i| self.time[i]).collect(),
            values: pick(&self.values),
            depth: self.depth.as_ref().map(pick),
            lat: self.lat.as_ref().map(pick),
            lon: self.lon.as_ref().map(pick),
        }
    }

    pub fn as_input(&self) -> TestInput<'_> {
        TestInput {
            values: &self.values,
            time: Some(&self.time),
            depth: self.depth.as_deref(),
            lat: self.lat.as_deref(),
            lon: self.lon.as_deref(),
        }
    }
}

/// Borrowed view of the inputs handed to a registered test
#[derive(Debug, Clone, Copy)]
pub struct TestInput<'a> {
    pub values: &'a [Option<f64>],
    pub time: Option<&'a [DateTime<Utc>]>,
    pub depth: Option<&'a [Option<f64>]>,
    pub lat: Option<&'a [Option<f64>]>,
    pub lon: Option<&'a [Option<f64>]>,
}

impl<'a> TestInput<'a> {
    pub fn values(values: &'a [Option<f64>]) -> Self {
        Self {
            values,
            time: None,
            depth: None,
            lat: None,
            lon: None,
        }
    }

    pub fn require_time(&self, test: &str) -> Result<&'a [DateTime<Utc>]> {
        self.time.ok_or_else(|| QcError::missing_axis(test, "time"))
    }

    pub fn require_depth(&self, test: &str) -> Result<&'a [Option<f64>]> {
        self.depth.ok_or_else(|| QcError::missing_axis(test, "depth"))
    }

    pub fn require_position(&self, test: &str) -> Result<(&'a [Option<f64>], &'a [Option<f64>])> {
        let lat = self.lat.ok_or_else(|| QcError::missing_axis(test, "lat"))?;
        let lon = self.lon.ok_or_else(|| QcError::missing_axis(test, "lon"))?;
        Ok((lat, lon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_flag_severity_ordering() {
        assert!(Flag::NotEvaluated < Flag::Pass);
        assert!(Flag::Pass < Flag::Suspect);
        assert!(Flag::Suspect < Flag::Fail);
        assert!(Flag::Fail < Flag::Missing);
        assert_eq!(
            [Flag::Pass, Flag::Fail, Flag::Suspect].iter().max(),
            Some(&Flag::Fail)
        );
    }

    #[test]
    fn test_flag_numeric_encoding() {
        assert_eq!(u8::from(Flag::Pass), 1);
        assert_eq!(u8::from(Flag::NotEvaluated), 2);
        assert_eq!(u8::from(Flag::Suspect), 3);
        assert_eq!(u8::from(Flag::Fail), 4);
        assert_eq!(u8::from(Flag::Missing), 9);
        assert_eq!(Flag::try_from(3), Ok(Flag::Suspect));
        assert!(Flag::try_from(5).is_err());
    }

    #[test]
    fn test_flag_serializes_as_number() {
        let json = serde_json::to_string(&vec![Flag::Pass, Flag::Missing]).unwrap();
        assert_eq!(json, "[1,9]");
        let back: Vec<Flag> = serde_json::from_str("[4,2]").unwrap();
        assert_eq!(back, vec![Flag::Fail, Flag::NotEvaluated]);
    }

    #[test]
    fn test_span_validation() {
        assert!(Span::new(0.0, 10.0).validate("x").is_ok());
        assert!(Span::new(5.0, 5.0).validate("x").is_ok());
        let err = Span::new(10.0, 0.0).validate("temp.qartod.gross_range_test.fail_span");
        assert!(matches!(err, Err(QcError::InvalidSpan { .. })));
        assert!(Span::new(f64::NAN, 1.0).validate("x").is_err());
    }

    #[test]
    fn test_span_contains_is_inclusive() {
        let span = Span::new(0.0, 10.0);
        assert!(span.contains(0.0));
        assert!(span.contains(10.0));
        assert!(!span.contains(10.000001));
        assert!(!span.contains(-1.0));
    }

    #[test]
    fn test_window_bounds() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap();
        let window = TimeWindow::new(Some(start), Some(end));
        assert!(window.contains(&start));
        assert!(!window.contains(&end));
        assert!(TimeWindow::default().contains(&end));
        assert!(TimeWindow::new(Some(end), Some(start)).validate("ctx").is_err());
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2020, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2020-04-01T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2020-04-01T00:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2020-04-01").unwrap(), expected);
        assert!(parse_timestamp("April 1st").is_err());
    }

    #[test]
    fn test_window_serde_round_trip() {
        let window: TimeWindow =
            serde_json::from_str(r#"{"starting": "2020-01-01T00:00:00", "ending": null}"#).unwrap();
        assert!(window.ending.is_none());
        let text = serde_json::to_string(&window).unwrap();
        let back: TimeWindow = serde_json::from_str(&text).unwrap();
        assert_eq!(window, back);
    }

    #[test]
    fn test_samples_length_checks() {
        let time = vec![Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()];
        assert!(Samples::new(time.clone(), vec![Some(1.0), None]).is_err());
        let samples = Samples::new(time, vec![Some(1.0)]).unwrap();
        assert!(samples.clone().with_depth(vec![]).is_err());
        assert!(samples.with_position(vec![Some(1.0)], vec![Some(2.0)]).is_ok());
    }

    #[test]
    fn test_samples_subset_keeps_axes_aligned() {
        let time: Vec<_> = (0..4)
            .map(|d| Utc.with_ymd_and_hms(2020, 1, 1 + d, 0, 0, 0).unwrap())
            .collect();
        let samples = Samples::new(time.clone(), vec![Some(0.0), Some(1.0), None, Some(3.0)])
            .unwrap()
            .with_depth(vec![Some(10.0), Some(11.0), Some(12.0), Some(13.0)])
            .unwrap();
        let subset = samples.subset(&[1, 3]);
        assert_eq!(subset.time, vec![time[1], time[3]]);
        assert_eq!(subset.values, vec![Some(1.0), Some(3.0)]);
        assert_eq!(subset.depth, Some(vec![Some(11.0), Some(13.0)]));
        assert!(subset.lat.is_none());
    }

    #[test]
    fn test_finite_filters_nan() {
        assert_eq!(finite(Some(f64::NAN)), None);
        assert_eq!(finite(Some(f64::INFINITY)), None);
        assert_eq!(finite(Some(2.0)), Some(2.0));
        assert_eq!(finite(None), None);
    }
}
