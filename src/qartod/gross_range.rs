//! Gross range test: flag values outside sensor or climatological limits.

use crate::error::{QcError, Result};
use crate::models::{Flag, Span, finite};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrossRangeParams {
    /// Values outside this span FAIL
    pub fail_span: Span,
    /// Values inside `fail_span` but outside this span are SUSPECT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspect_span: Option<Span>,
}

impl GrossRangeParams {
    pub fn validate(&self, location: &str) -> Result<()> {
        self.fail_span.validate(&format!("{}.fail_span", location))?;
        if let Some(suspect) = &self.suspect_span {
            suspect.validate(&format!("{}.suspect_span", location))?;
            if !self.fail_span.encloses(suspect) {
                return Err(QcError::configuration(
                    format!("{}.suspect_span", location),
                    "suspect_span must lie within fail_span",
                ));
            }
        }
        Ok(())
    }
}

pub fn gross_range_test(values: &[Option<f64>], params: &GrossRangeParams) -> Vec<Flag> {
    values
        .iter()
        .map(|v| match finite(*v) {
            None => Flag::Missing,
            Some(v) => range_flag(v, Some(&params.fail_span), params.suspect_span.as_ref()),
        })
        .collect()
}

/// Shared inclusive two-tier range logic
pub(crate) fn range_flag(value: f64, fail: Option<&Span>, suspect: Option<&Span>) -> Flag {
    if fail.is_some_and(|span| !span.contains(value)) {
        Flag::Fail
    } else if suspect.is_some_and(|span| !span.contains(value)) {
        Flag::Suspect
    } else {
        Flag::Pass
    }
}
