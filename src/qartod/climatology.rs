//! Climatology test: seasonal (and optionally depth-banded) range checks.

use crate::error::{QcError, Result};
use crate::models::{Flag, Span, finite};
use crate::qartod::check_length;
use crate::qartod::gross_range::range_flag;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Calendar unit that `tspan` bounds are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// 1..=12
    Month,
    /// 1..=366
    #[serde(alias = "dayofyear")]
    DayOfYear,
    /// ISO week, 1..=53
    #[serde(alias = "weekofyear")]
    Week,
    /// 1..=4
    Quarter,
}

impl Period {
    pub fn of(self, time: &DateTime<Utc>) -> f64 {
        let value = match self {
            Period::Month => time.month(),
            Period::DayOfYear => time.ordinal(),
            Period::Week => time.iso_week().week(),
            Period::Quarter => (time.month() - 1) / 3 + 1,
        };
        f64::from(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClimatologyEntry {
    /// Inclusive range of period values this entry covers
    pub tspan: Span,
    /// Depth band; entries without one apply at any depth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zspan: Option<Span>,
    #[serde(alias = "vspan")]
    pub suspect_span: Span,
    #[serde(default, alias = "fspan", skip_serializing_if = "Option::is_none")]
    pub fail_span: Option<Span>,
    /// Per-entry period; must agree with every other entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
}

impl ClimatologyEntry {
    fn matches(&self, period_value: f64, depth: Option<f64>) -> bool {
        self.tspan.contains(period_value)
            && self
                .zspan
                .is_none_or(|zspan| depth.is_some_and(|z| zspan.contains(z)))
    }

    fn could_overlap(&self, other: &ClimatologyEntry) -> bool {
        if !self.tspan.overlaps(&other.tspan) {
            return false;
        }
        match (&self.zspan, &other.zspan) {
            (Some(a), Some(b)) => a.overlaps(b),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClimatologyParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    #[serde(rename = "config", alias = "entries")]
    pub entries: Vec<ClimatologyEntry>,
}

impl ClimatologyParams {
    /// The single period shared by all entries
    pub fn effective_period(&self) -> Option<Period> {
        self.period
            .or_else(|| self.entries.iter().find_map(|e| e.period))
    }

    pub fn validate(&self, location: &str) -> Result<()> {
        if self.entries.is_empty() {
            return Err(QcError::configuration(
                location,
                "at least one climatology entry is required",
            ));
        }
        let Some(period) = self.effective_period() else {
            return Err(QcError::configuration(
                format!("{}.period", location),
                "a period (month, day_of_year, week or quarter) is required",
            ));
        };

        for (i, entry) in self.entries.iter().enumerate() {
            let at = format!("{}.config[{}]", location, i);
            if entry.period.is_some_and(|p| p != period) {
                return Err(QcError::configuration(
                    format!("{}.period", at),
                    "all climatology entries must share one period",
                ));
            }
            entry.tspan.validate(&format!("{}.tspan", at))?;
            entry.suspect_span.validate(&format!("{}.suspect_span", at))?;
            if let Some(zspan) = &entry.zspan {
                zspan.validate(&format!("{}.zspan", at))?;
            }
            if let Some(fail) = &entry.fail_span {
                fail.validate(&format!("{}.fail_span", at))?;
                if !fail.encloses(&entry.suspect_span) {
                    return Err(QcError::configuration(
                        format!("{}.suspect_span", at),
                        "suspect_span must lie within fail_span",
                    ));
                }
            }
        }

        for (i, a) in self.entries.iter().enumerate() {
            for (j, b) in self.entries.iter().enumerate().skip(i + 1) {
                if a.could_overlap(b) {
                    return Err(QcError::configuration(
                        format!("{}.config", location),
                        format!("entries {} and {} cover overlapping times and depths", i, j),
                    ));
                }
            }
        }
        Ok(())
    }

    fn entry_for(
        &self,
        period: Period,
        time: &DateTime<Utc>,
        depth: Option<f64>,
    ) -> Option<&ClimatologyEntry> {
        let value = period.of(time);
        self.entries.iter().find(|e| e.matches(value, depth))
    }
}

/// Apply the matching entry's spans to each sample; unmatched samples are
/// NOT_EVALUATED.
pub fn climatology_test(
    values: &[Option<f64>],
    time: &[DateTime<Utc>],
    depth: Option<&[Option<f64>]>,
    params: &ClimatologyParams,
) -> Result<Vec<Flag>> {
    check_length("time", values.len(), time.len())?;
    if let Some(depth) = depth {
        check_length("depth", values.len(), depth.len())?;
    }
    let Some(period) = params.effective_period() else {
        return Err(QcError::configuration("climatology_test.period", "no period configured"));
    };

    let flags = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let Some(value) = finite(*v) else {
                return Flag::Missing;
            };
            let z = depth.and_then(|d| finite(d[i]));
            match params.entry_for(period, &time[i], z) {
                Some(entry) => {
                    range_flag(value, entry.fail_span.as_ref(), Some(&entry.suspect_span))
                }
                None => Flag::NotEvaluated,
            }
        })
        .collect();
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Flag::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn entry(
        tspan: [f64; 2],
        zspan: Option<[f64; 2]>,
        suspect: [f64; 2],
        fail: Option<[f64; 2]>,
    ) -> ClimatologyEntry {
        ClimatologyEntry {
            tspan: tspan.into(),
            zspan: zspan.map(Span::from),
            suspect_span: suspect.into(),
            fail_span: fail.map(Span::from),
            period: None,
        }
    }

    fn seasonal() -> ClimatologyParams {
        ClimatologyParams {
            period: Some(Period::Month),
            entries: vec![
                entry([1.0, 6.0], None, [10.0, 20.0], Some([5.0, 25.0])),
                entry([7.0, 12.0], None, [15.0, 30.0], None),
            ],
        }
    }

    #[test]
    fn test_period_values() {
        let t = Utc.with_ymd_and_hms(2021, 8, 15, 0, 0, 0).unwrap();
        assert_eq!(Period::Month.of(&t), 8.0);
        assert_eq!(Period::Quarter.of(&t), 3.0);
        assert_eq!(Period::DayOfYear.of(&t), 227.0);
        assert_eq!(Period::Week.of(&t), 32.0);
    }

    #[test]
    fn test_seasonal_spans() {
        let time = vec![
            Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 2, 2, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 8, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 8, 2, 0, 0, 0).unwrap(),
        ];
        let values = vec![Some(15.0), Some(22.0), Some(30.0), Some(12.0), None];
        let flags = climatology_test(&values, &time, None, &seasonal()).unwrap();
        assert_eq!(flags, vec![Pass, Suspect, Fail, Suspect, Missing]);
    }

    #[test]
    fn test_depth_bands_and_no_match() {
        let params = ClimatologyParams {
            period: Some(Period::Quarter),
            entries: vec![
                entry([1.0, 2.0], Some([0.0, 10.0]), [10.0, 20.0], None),
                entry([1.0, 2.0], Some([10.5, 100.0]), [0.0, 5.0], None),
            ],
        };
        let t = Utc.with_ymd_and_hms(2021, 4, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2021, 11, 1, 0, 0, 0).unwrap();
        let time = vec![t, t, t, late];
        let values = vec![Some(15.0), Some(15.0), Some(15.0), Some(15.0)];
        let depth = vec![Some(5.0), Some(50.0), None, Some(5.0)];
        let flags = climatology_test(&values, &time, Some(&depth), &params).unwrap();
        assert_eq!(flags, vec![Pass, Suspect, NotEvaluated, NotEvaluated]);
    }

    #[test]
    fn test_overlapping_entries_rejected() {
        let params = ClimatologyParams {
            period: Some(Period::Month),
            entries: vec![
                entry([1.0, 6.0], None, [0.0, 1.0], None),
                entry([6.0, 12.0], Some([0.0, 10.0]), [0.0, 1.0], None),
            ],
        };
        let err = params.validate("temp.qartod.climatology_test").unwrap_err();
        assert!(err.to_string().contains("overlapping"));
        assert!(seasonal().validate("temp.qartod.climatology_test").is_ok());
    }

    #[test]
    fn test_period_required_and_shared() {
        let mut params = seasonal();
        params.period = None;
        assert!(params.validate("t").is_err());

        params.entries[0].period = Some(Period::Month);
        params.entries[1].period = Some(Period::Week);
        assert!(params.validate("t").is_err());

        params.entries[1].period = Some(Period::Month);
        assert!(params.validate("t").is_ok());
    }

    #[test]
    fn test_parse_with_short_aliases() {
        let params: ClimatologyParams = serde_json::from_value(json!({
            "config": [
                {"tspan": [1, 3], "vspan": [0, 10], "fspan": [-5, 15], "period": "month"},
                {"tspan": [4, 12], "vspan": [5, 20], "period": "month"}
            ]
        }))
        .unwrap();
        assert_eq!(params.effective_period(), Some(Period::Month));
        assert_eq!(params.entries[0].fail_span, Some(Span::new(-5.0, 15.0)));
        assert!(params.validate("t").is_ok());
    }
}
